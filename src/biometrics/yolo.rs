//! Decoding of YOLO-style face detector output.
//!
//! Kept apart from the ONNX session code so it builds and tests without the
//! runtime.

use crate::core::detection::{Detection, DetectionBox};

const MIN_RAW_CONFIDENCE: f32 = 0.001;
const MIN_BOX_SIDE: f32 = 10.0;

/// Row layout of the raw output tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Layout {
    predictions: usize,
    values: usize,
    transposed: bool,
}

fn layout(shape: &[usize]) -> Option<Layout> {
    let layout = match shape.len() {
        // [1, 5, N] is transposed, [1, N, 5] is row-major.
        3 if shape[1] <= 10 && shape[2] > 10 => Layout {
            predictions: shape[2],
            values: shape[1],
            transposed: true,
        },
        3 => Layout { predictions: shape[1], values: shape[2], transposed: false },
        2 => Layout { predictions: shape[0], values: shape[1], transposed: false },
        _ => return None,
    };
    Some(layout)
}

/// Turn raw `[cx, cy, w, h, conf]` predictions into boxes in detector-input
/// pixel space. Coordinates in 0..=1 are treated as normalized.
pub fn decode(data: &[f32], shape: &[usize], input_width: u32, input_height: u32) -> Vec<Detection> {
    let Some(layout) = layout(shape) else {
        tracing::warn!("Unexpected detector output shape: {:?}", shape);
        return Vec::new();
    };
    if layout.values < 5 || data.len() < layout.predictions * layout.values {
        tracing::warn!(
            "Detector output too short: {} values for shape {:?}",
            data.len(),
            shape
        );
        return Vec::new();
    }

    let in_w = input_width as f32;
    let in_h = input_height as f32;
    let value = |i: usize, k: usize| {
        if layout.transposed {
            data[k * layout.predictions + i]
        } else {
            data[i * layout.values + k]
        }
    };

    let mut detections = Vec::new();
    for i in 0..layout.predictions {
        let confidence = value(i, 4);
        if confidence <= MIN_RAW_CONFIDENCE {
            continue;
        }

        let (mut cx, mut cy, mut w, mut h) = (value(i, 0), value(i, 1), value(i, 2), value(i, 3));
        if cx <= 1.0 && cy <= 1.0 && w <= 1.0 && h <= 1.0 {
            cx *= in_w;
            w *= in_w;
            cy *= in_h;
            h *= in_h;
        }

        let bbox = DetectionBox::from_center(cx, cy, w, h).clamp_to(input_width, input_height);
        if bbox.width > MIN_BOX_SIDE && bbox.height > MIN_BOX_SIDE {
            detections.push(Detection::new(bbox, confidence));
        }
    }
    detections
}

/// Map boxes from detector-input space back onto the source image.
pub fn rescale(detections: &mut [Detection], input_width: u32, input_height: u32, image_width: u32, image_height: u32) {
    let sx = image_width as f32 / input_width as f32;
    let sy = image_height as f32 / input_height as f32;
    for detection in detections {
        detection.bbox = detection.bbox.scale(sx, sy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_major_output() {
        let data = vec![
            320.0, 240.0, 100.0, 120.0, 0.9, //
            10.0, 10.0, 4.0, 4.0, 0.8, // too small
            100.0, 100.0, 50.0, 50.0, 0.0, // no confidence
        ];
        let detections = decode(&data, &[1, 3, 5], 640, 640);
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].bbox, DetectionBox::new(270.0, 180.0, 100.0, 120.0));
    }

    #[test]
    fn transposed_output_uses_prediction_stride() {
        // Twelve predictions laid out as [1, 5, 12], two of them live.
        let n = 12;
        let mut data = vec![0.0f32; 5 * n];
        for (k, v) in [320.0, 320.0, 64.0, 64.0, 0.7].into_iter().enumerate() {
            data[k * n + 3] = v;
        }
        for (k, v) in [100.0, 100.0, 40.0, 40.0, 0.95].into_iter().enumerate() {
            data[k * n + 7] = v;
        }
        let detections = decode(&data, &[1, 5, n], 640, 640);
        assert_eq!(detections.len(), 2);
        assert!((detections[1].confidence - 0.95).abs() < 1e-6);
        assert_eq!(detections[1].bbox, DetectionBox::new(80.0, 80.0, 40.0, 40.0));
    }

    #[test]
    fn normalized_coordinates_are_scaled() {
        let data = vec![0.5, 0.5, 0.25, 0.25, 0.9];
        let detections = decode(&data, &[1, 5], 640, 480);
        assert_eq!(detections[0].bbox, DetectionBox::new(240.0, 180.0, 160.0, 120.0));
    }

    #[test]
    fn malformed_shapes_yield_nothing() {
        assert!(decode(&[0.0; 10], &[10], 640, 640).is_empty());
        assert!(decode(&[0.0; 4], &[1, 1, 5], 640, 640).is_empty());
        assert!(decode(&[0.0; 8], &[2, 4], 640, 640).is_empty());
    }

    #[test]
    fn rescale_maps_back_to_source() {
        let mut detections = vec![Detection::new(DetectionBox::new(320.0, 320.0, 64.0, 64.0), 0.9)];
        rescale(&mut detections, 640, 640, 1280, 960);
        assert_eq!(detections[0].bbox, DetectionBox::new(640.0, 480.0, 128.0, 96.0));
    }
}
