use crate::models::Distraction;
use crate::perception::DetectedObject;

/// Detector labels that compete with the focus task.
pub const DEFAULT_DISTRACTION_LABELS: [&str; 5] = ["cell phone", "book", "remote", "tv", "laptop"];
pub const DEFAULT_MIN_DISTRACTION_CONFIDENCE: f32 = 0.5;

/// Keeps detector hits whose label is in `labels` (case-insensitive) and
/// whose confidence reaches `min_confidence`.
pub fn filter_distractions(
    objects: &[DetectedObject],
    labels: &[String],
    min_confidence: f32,
) -> Vec<Distraction> {
    objects
        .iter()
        .filter(|object| object.confidence >= min_confidence)
        .filter(|object| labels.iter().any(|label| label.eq_ignore_ascii_case(&object.label)))
        .map(|object| Distraction {
            object_label: object.label.clone(),
            confidence: object.confidence,
            bounding_box: object.bounding_box,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BoundingBox;

    fn object(label: &str, confidence: f32) -> DetectedObject {
        DetectedObject {
            label: label.into(),
            confidence,
            bounding_box: BoundingBox {
                x: 0.0,
                y: 0.0,
                width: 10.0,
                height: 10.0,
            },
        }
    }

    fn default_labels() -> Vec<String> {
        DEFAULT_DISTRACTION_LABELS.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn keeps_only_listed_confident_objects() {
        let objects = vec![
            object("person", 0.99),
            object("cell phone", 0.9),
            object("Book", 0.8),
            object("tv", 0.3),
        ];
        let found = filter_distractions(&objects, &default_labels(), DEFAULT_MIN_DISTRACTION_CONFIDENCE);
        let labels: Vec<_> = found.iter().map(|d| d.object_label.as_str()).collect();
        assert_eq!(labels, vec!["cell phone", "Book"]);
    }
}
