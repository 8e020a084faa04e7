//! Embedded HTML for the upload form and the result page. Kept as plain
//! strings so the binary needs no template files at runtime.

use crate::bounding_box::DetectedRegion;

pub const INDEX_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>Image Labeler</title>
</head>
<body>
  <h1>Image Labeler</h1>
  <p>Upload a JPEG or PNG image to detect and label the objects in it.</p>
  <form action="/upload" method="post" enctype="multipart/form-data">
    <input type="file" name="image" accept="image/jpeg,image/png" required>
    <button type="submit">Detect objects</button>
  </form>
</body>
</html>
"#;

pub fn result_page(
    original_url: &str,
    annotated_url: &str,
    regions: &[DetectedRegion],
    threshold: f32,
) -> String {
    let mut items = String::new();
    for region in regions {
        let note = if region.confidence < threshold {
            " (below threshold, not drawn)"
        } else {
            ""
        };
        items.push_str(&format!(
            "    <li>{} &mdash; {:.1}%{}</li>\n",
            escape_html(&region.label),
            region.confidence,
            note
        ));
    }
    if items.is_empty() {
        items.push_str("    <li>No objects detected.</li>\n");
    }

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>Detection result</title>
</head>
<body>
  <h1>Detection result</h1>
  <h2>Original</h2>
  <img src="{original_url}" alt="original upload" style="max-width: 45%">
  <h2>Annotated</h2>
  <img src="{annotated_url}" alt="annotated upload" style="max-width: 45%">
  <h2>Detections</h2>
  <ul>
{items}  </ul>
  <p><a href="/">Upload another image</a></p>
</body>
</html>
"#
    )
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounding_box::NormalizedBox;

    #[test]
    fn result_page_references_both_images() {
        let page = result_page("/uploads/a.jpg", "/uploads/labeled_a.jpg", &[], 50.0);

        assert!(page.contains(r#"src="/uploads/a.jpg""#));
        assert!(page.contains(r#"src="/uploads/labeled_a.jpg""#));
        assert!(page.contains("No objects detected."));
    }

    #[test]
    fn labels_are_escaped() {
        let regions = [DetectedRegion::new(
            "<script>alert(1)</script>",
            90.0,
            NormalizedBox::new(0.0, 0.0, 1.0, 1.0),
        )];
        let page = result_page("/uploads/a.jpg", "/uploads/b.jpg", &regions, 50.0);

        assert!(!page.contains("<script>"));
        assert!(page.contains("&lt;script&gt;"));
    }
}
