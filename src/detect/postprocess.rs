//! Shared post-processing for model outputs.

use crate::detect::result::Detection;

/// COCO class names, in the order YOLOv8 checkpoints emit them.
pub const COCO_LABELS: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch", "potted plant",
    "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote", "keyboard", "cell phone",
    "microwave", "oven", "toaster", "sink", "refrigerator", "book", "clock", "vase", "scissors",
    "teddy bear", "hair drier", "toothbrush",
];

/// Label for a class index, falling back to `class_<id>` for unknown indices.
pub fn label_for(labels: &[String], class_id: usize) -> String {
    labels
        .get(class_id)
        .cloned()
        .unwrap_or_else(|| format!("class_{class_id}"))
}

/// Per-class greedy non-maximum suppression.
///
/// Keeps the highest-scoring box and drops any later box of the same class that
/// overlaps a kept one by more than `iou_threshold`. Output is sorted by descending
/// confidence.
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for det in detections {
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == det.class_id && k.bbox.iou(&det.bbox) > iou_threshold);
        if !suppressed {
            kept.push(det);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::BoundingBox;

    fn det(class_id: usize, confidence: f32, x: f32) -> Detection {
        Detection::new(
            class_id,
            COCO_LABELS[class_id],
            confidence,
            BoundingBox::new(x, 0.0, x + 100.0, 100.0),
        )
    }

    #[test]
    fn nms_drops_overlapping_boxes_of_same_class() {
        let kept = non_max_suppression(vec![det(2, 0.6, 5.0), det(2, 0.9, 0.0)], 0.45);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].confidence, 0.9);
    }

    #[test]
    fn nms_keeps_overlapping_boxes_of_different_classes() {
        let kept = non_max_suppression(vec![det(2, 0.6, 5.0), det(7, 0.9, 0.0)], 0.45);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn nms_keeps_separate_boxes() {
        let kept = non_max_suppression(vec![det(2, 0.6, 0.0), det(2, 0.9, 300.0)], 0.45);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn unknown_class_gets_generic_label() {
        let labels: Vec<String> = COCO_LABELS.iter().map(|s| s.to_string()).collect();
        assert_eq!(label_for(&labels, 2), "car");
        assert_eq!(label_for(&labels, 99), "class_99");
    }
}
