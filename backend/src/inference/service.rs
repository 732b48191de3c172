use ndarray::Array4;
use shared::ClassLabel;
use std::sync::Arc;

use super::InferenceError;
use super::classifier::Classifier;
use super::preprocess::{decode_image, prepare_image};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub label: ClassLabel,
    /// Model output at the predicted class, scaled by 100.
    pub probability: f32,
}

/// Owns the loaded model. Built once at startup and shared read-only with
/// every request handler.
#[derive(Clone)]
pub struct InferenceService {
    classifier: Arc<dyn Classifier>,
}

impl InferenceService {
    pub fn new(classifier: Arc<dyn Classifier>) -> Self {
        Self { classifier }
    }

    pub fn model_name(&self) -> &str {
        self.classifier.name()
    }

    /// Decode, prepare and classify one uploaded image.
    pub fn classify(&self, image: &[u8]) -> Result<Prediction, InferenceError> {
        let img = decode_image(image)?;
        let tensor = prepare_image(&img)?;
        self.predict_result(&tensor)
    }

    pub fn predict_result(&self, tensor: &Array4<f32>) -> Result<Prediction, InferenceError> {
        let output = self.classifier.predict(tensor)?;
        let (index, value) = argmax(&output)
            .ok_or_else(|| InferenceError::InvalidOutput("no comparable score in output".into()))?;
        if !value.is_finite() {
            return Err(InferenceError::InvalidOutput(format!(
                "score {} at class index {} is not finite",
                value, index
            )));
        }
        let label = ClassLabel::from_index(index).ok_or_else(|| {
            InferenceError::InvalidOutput(format!(
                "class index {} outside of {} known labels",
                index,
                ClassLabel::COUNT
            ))
        })?;

        Ok(Prediction {
            label,
            probability: value * 100.0,
        })
    }
}

/// Index and value of the largest element; the first one wins on ties.
/// NaN entries are never selected.
pub fn argmax(values: &[f32]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        match best {
            Some((_, best_value)) if v <= best_value => {}
            _ => best = Some((i, v)),
        }
    }
    best
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::inference::preprocess::tests::png_bytes;
    use image::{DynamicImage, GrayImage, Luma};

    /// Returns a fixed output vector regardless of input.
    pub(crate) struct FixedClassifier(pub Vec<f32>);

    impl Classifier for FixedClassifier {
        fn predict(&self, input: &Array4<f32>) -> Result<Vec<f32>, InferenceError> {
            assert_eq!(input.shape(), &[1, 150, 150, 3]);
            Ok(self.0.clone())
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    /// Softmax over four logits derived from the mean pixel intensity, so
    /// different images get different but deterministic answers.
    pub(crate) struct MeanIntensityClassifier;

    impl Classifier for MeanIntensityClassifier {
        fn predict(&self, input: &Array4<f32>) -> Result<Vec<f32>, InferenceError> {
            let mean = input.mean().unwrap_or(0.0) / 255.0;
            let logits = [mean * 4.0, 1.0, 2.0 - mean * 2.0, 0.5];
            let max = logits.iter().cloned().fold(f32::MIN, f32::max);
            let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
            let sum: f32 = exps.iter().sum();
            Ok(exps.into_iter().map(|e| e / sum).collect())
        }

        fn name(&self) -> &str {
            "mean-intensity"
        }
    }

    fn service(classifier: impl Classifier + 'static) -> InferenceService {
        InferenceService::new(Arc::new(classifier))
    }

    fn tensor() -> Array4<f32> {
        Array4::zeros((1, 150, 150, 3))
    }

    #[test]
    fn argmax_prefers_lowest_index_on_ties() {
        assert_eq!(argmax(&[0.1, 0.4, 0.4, 0.1]), Some((1, 0.4)));
        assert_eq!(argmax(&[0.25; 4]), Some((0, 0.25)));
        assert_eq!(argmax(&[-3.0, -1.0, -2.0]), Some((1, -1.0)));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn argmax_skips_nan() {
        assert_eq!(argmax(&[0.2, f32::NAN, 0.7]), Some((2, 0.7)));
        assert_eq!(argmax(&[f32::NAN, 0.1, 0.3]), Some((2, 0.3)));
        assert_eq!(argmax(&[f32::NAN; 4]), None);
    }

    #[test]
    fn non_finite_scores_are_rejected() {
        for output in [vec![f32::NAN; 4], vec![0.1, f32::INFINITY, 0.2, 0.3]] {
            let err = service(FixedClassifier(output))
                .predict_result(&tensor())
                .unwrap_err();
            assert!(matches!(err, InferenceError::InvalidOutput(_)));
            assert!(!err.is_client_error());
        }
    }

    #[test]
    fn prediction_maps_index_to_label_and_scales() {
        let svc = service(FixedClassifier(vec![0.05, 0.1, 0.8, 0.05]));
        let prediction = svc.predict_result(&tensor()).unwrap();
        assert_eq!(prediction.label, ClassLabel::Drusen);
        assert!((prediction.probability - 80.0).abs() < 1e-4);
    }

    #[test]
    fn softmax_output_stays_in_percentage_range() {
        let svc = service(MeanIntensityClassifier);
        for shade in [0u8, 60, 128, 200, 255] {
            let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(30, 30, Luma([shade])));
            let prediction = svc.classify(&png_bytes(&img)).unwrap();
            assert!((0.0..=100.0).contains(&prediction.probability));
            assert_eq!(ClassLabel::from_index(prediction.label.index()), Some(prediction.label));
        }
    }

    #[test]
    fn raw_output_is_passed_through_unnormalized() {
        let svc = service(FixedClassifier(vec![2.0, 3.5, 1.0, 0.0]));
        let prediction = svc.predict_result(&tensor()).unwrap();
        assert_eq!(prediction.label, ClassLabel::Dme);
        assert_eq!(prediction.probability, 350.0);
    }

    #[test]
    fn malformed_outputs_are_rejected() {
        let empty = service(FixedClassifier(vec![]));
        assert!(matches!(
            empty.predict_result(&tensor()),
            Err(InferenceError::InvalidOutput(_))
        ));

        let too_wide = service(FixedClassifier(vec![0.0, 0.0, 0.0, 0.0, 1.0]));
        let err = too_wide.predict_result(&tensor()).unwrap_err();
        assert!(matches!(err, InferenceError::InvalidOutput(_)));
        assert!(!err.is_client_error());
    }

    #[test]
    fn classify_is_deterministic() {
        let svc = service(MeanIntensityClassifier);
        let img = DynamicImage::ImageLuma8(GrayImage::from_fn(80, 50, |x, y| {
            Luma([((x + y) % 256) as u8])
        }));
        let bytes = png_bytes(&img);
        assert_eq!(svc.classify(&bytes).unwrap(), svc.classify(&bytes).unwrap());
    }
}
