use crate::bounding_box::{DetectedRegion, NormalizedBox};
use crate::config::DetectionConfig;
use crate::storage::MediaType;
use serde::Deserialize;
use thiserror::Error;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("detection provider request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("detection provider rejected the credentials: {0}")]
    Auth(String),
    #[error("detection provider throttled the request: {0}")]
    Throttled(String),
    #[error("detection provider returned {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("detection client misconfigured: {0}")]
    Misconfigured(String),
}

/// Response body of the provider's detect-labels call. Labels carry zero or
/// more located instances; labels without instances describe the scene as a
/// whole and produce no regions.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DetectLabelsResponse {
    #[serde(default)]
    labels: Vec<ProviderLabel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ProviderLabel {
    name: String,
    confidence: f32,
    #[serde(default)]
    instances: Vec<ProviderInstance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ProviderInstance {
    bounding_box: Option<ProviderBox>,
    confidence: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ProviderBox {
    left: f32,
    top: f32,
    width: f32,
    height: f32,
}

/// Flatten label/instance pairs into regions, preserving response order.
fn flatten_labels(labels: Vec<ProviderLabel>) -> Vec<DetectedRegion> {
    let mut regions = Vec::new();
    for label in labels {
        for instance in label.instances {
            let Some(bbox) = instance.bounding_box else {
                continue;
            };
            let confidence = instance.confidence.unwrap_or(label.confidence);
            regions.push(DetectedRegion::new(
                label.name.clone(),
                confidence,
                NormalizedBox::new(bbox.left, bbox.top, bbox.width, bbox.height),
            ));
        }
    }
    regions
}

/// Client for the cloud detection capability. The fixture variant exists so
/// local runs and tests never touch the network.
pub enum DetectionClient {
    LiveProvider(LiveProvider),
    FixedFixture(FixedFixture),
}

impl DetectionClient {
    pub fn from_config(config: &DetectionConfig) -> Result<Self, DetectionError> {
        if config.dry_run {
            return Ok(Self::FixedFixture(FixedFixture::sample()));
        }

        let endpoint = config
            .endpoint
            .clone()
            .filter(|e| !e.is_empty())
            .ok_or_else(|| DetectionError::Misconfigured("endpoint is not set".into()))?;
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| DetectionError::Misconfigured("api_key is not set".into()))?;

        Ok(Self::LiveProvider(LiveProvider {
            http: reqwest::Client::new(),
            endpoint,
            api_key,
            max_labels: config.max_labels,
            min_confidence: config.min_confidence,
        }))
    }

    pub async fn detect(
        &self,
        image_bytes: &[u8],
        media_type: MediaType,
    ) -> Result<Vec<DetectedRegion>, DetectionError> {
        match self {
            Self::LiveProvider(provider) => provider.detect(image_bytes, media_type).await,
            Self::FixedFixture(fixture) => Ok(fixture.regions.clone()),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::LiveProvider(_) => "live",
            Self::FixedFixture(_) => "fixture",
        }
    }
}

pub struct LiveProvider {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    max_labels: u32,
    min_confidence: f32,
}

impl LiveProvider {
    #[instrument(skip(self, image_bytes))]
    async fn detect(
        &self,
        image_bytes: &[u8],
        media_type: MediaType,
    ) -> Result<Vec<DetectedRegion>, DetectionError> {
        let response = self
            .http
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header(reqwest::header::CONTENT_TYPE, media_type.content_type())
            .query(&[
                ("max_labels", self.max_labels.to_string()),
                ("min_confidence", self.min_confidence.to_string()),
            ])
            .body(image_bytes.to_vec())
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(DetectionError::Auth(body_text(response).await));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(DetectionError::Throttled(body_text(response).await));
        }
        if !status.is_success() {
            return Err(DetectionError::Rejected {
                status: status.as_u16(),
                message: body_text(response).await,
            });
        }

        let body: DetectLabelsResponse = response.json().await?;
        let regions = flatten_labels(body.labels);
        tracing::debug!("Provider returned {} located regions", regions.len());

        Ok(regions)
    }
}

async fn body_text(response: reqwest::Response) -> String {
    response.text().await.unwrap_or_default()
}

/// Dry-run stand-in: one centered half-size sample detection.
pub struct FixedFixture {
    regions: Vec<DetectedRegion>,
}

impl FixedFixture {
    pub fn sample() -> Self {
        Self {
            regions: vec![DetectedRegion::new(
                "SampleObject",
                99.1,
                NormalizedBox::new(0.25, 0.25, 0.5, 0.5),
            )],
        }
    }

    #[cfg(test)]
    pub fn with_regions(regions: Vec<DetectedRegion>) -> Self {
        Self { regions }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fixture_is_deterministic() {
        let client = DetectionClient::FixedFixture(FixedFixture::sample());

        let first = client.detect(b"anything", MediaType::Jpeg).await.unwrap();
        let second = client.detect(b"anything", MediaType::Jpeg).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].label, "SampleObject");
        assert_eq!(first[0].bounding_box, NormalizedBox::new(0.25, 0.25, 0.5, 0.5));
    }

    #[tokio::test]
    async fn fixture_with_no_regions_detects_nothing() {
        let client = DetectionClient::FixedFixture(FixedFixture::with_regions(Vec::new()));
        let regions = client.detect(b"anything", MediaType::Png).await.unwrap();
        assert!(regions.is_empty());
    }

    #[test]
    fn parses_provider_response() {
        let body = r#"{
            "Labels": [
                {
                    "Name": "Cat",
                    "Confidence": 92.5,
                    "Instances": [
                        {
                            "BoundingBox": {"Left": 0.1, "Top": 0.2, "Width": 0.3, "Height": 0.4},
                            "Confidence": 91.0
                        },
                        {"Confidence": 88.0}
                    ]
                },
                {
                    "Name": "Animal",
                    "Confidence": 95.0,
                    "Instances": [
                        {
                            "BoundingBox": {"Left": 0.5, "Top": 0.5, "Width": 0.2, "Height": 0.2}
                        }
                    ]
                },
                {"Name": "Indoors", "Confidence": 80.0}
            ]
        }"#;

        let parsed: DetectLabelsResponse = serde_json::from_str(body).unwrap();
        let regions = flatten_labels(parsed.labels);

        // Box-less instances and instance-less labels produce no regions;
        // everything else keeps response order.
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].label, "Cat");
        assert_eq!(regions[0].confidence, 91.0);
        assert_eq!(regions[1].label, "Animal");
        assert_eq!(regions[1].confidence, 95.0);
    }

    #[test]
    fn empty_response_yields_no_regions() {
        let parsed: DetectLabelsResponse = serde_json::from_str("{}").unwrap();
        assert!(flatten_labels(parsed.labels).is_empty());
    }

    #[test]
    fn from_config_refuses_live_mode_without_credentials() {
        let config = DetectionConfig {
            dry_run: false,
            endpoint: Some("https://detect.example.com/v1/detect-labels".into()),
            api_key: None,
            max_labels: 10,
            min_confidence: 70.0,
        };

        assert!(matches!(
            DetectionClient::from_config(&config),
            Err(DetectionError::Misconfigured(_))
        ));
    }
}
