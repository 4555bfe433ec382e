//! Interprets the output vector of the leaf disease classifier.
//!
//! The classifier emits one score per entry of the [`Catalog`], index-aligned
//! with the catalog's ordered label list. This crate turns that vector into
//! probabilities, the arg-max [`Prediction`] and ranked [`Classifications`].

use ndarray::{Array, ArrayBase, Axis};
use tracing::debug;

use mltypes::{Classification, Classifications, MlError, MlResult, Prediction};

mod catalog;

pub use catalog::{Catalog, CatalogError, CatalogResult, ClassLabel, DiseaseInfo};

/// Length of the classifier output vector and of the label set.
pub const CLASS_COUNT: usize = 7;

/// Allowed distance of the probability sum from 1.0.
pub const PROBABILITY_TOLERANCE: f32 = 1e-3;

/// Normalizes raw logits into probabilities.
pub fn softmax(raw: &[f32]) -> Vec<f32> {
    Array::from_vec(raw.to_vec()).softmax(Axis(0)).to_vec()
}

/// Verifies that `probabilities` is a probability distribution.
///
/// A vector that does not sum to one usually means the graph emits logits
/// while the model metadata claims a softmax output.
pub fn check_probabilities(probabilities: &[f32]) -> MlResult<()> {
    if let Some((index, value)) = probabilities
        .iter()
        .enumerate()
        .find(|(_, p)| !p.is_finite() || **p < -PROBABILITY_TOLERANCE || **p > 1.0 + PROBABILITY_TOLERANCE)
    {
        return Err(MlError::InferenceError(format!(
            "output value {} at index {} is not a probability",
            value, index
        )));
    }

    let sum: f32 = probabilities.iter().sum();
    if (sum - 1.0).abs() > PROBABILITY_TOLERANCE {
        return Err(MlError::InferenceError(format!(
            "output probabilities sum to {} instead of 1",
            sum
        )));
    }

    Ok(())
}

/// Index of the largest probability; the first one wins on ties.
pub fn arg_max(probabilities: &[f32]) -> Option<Prediction> {
    probabilities
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (i, p)| match best {
            Some((_, b)) if b >= p => best,
            _ => Some((i, p)),
        })
        .map(|(class_index, confidence)| Prediction {
            class_index,
            confidence: confidence.clamp(0.0, 1.0),
        })
}

/// Pairs of `(index, probability)` sorted from most to least likely.
pub fn ranked(probabilities: &[f32]) -> Vec<(usize, f32)> {
    let mut ranked: Vec<(usize, f32)> = probabilities.iter().copied().enumerate().collect();

    // stable sort keeps the lower index first on ties, matching arg_max
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

    ranked
}

/// The `k` most likely classes with their catalog labels.
pub fn classify(probabilities: &[f32], catalog: &Catalog, k: usize) -> MlResult<Classifications> {
    if probabilities.len() != catalog.len() {
        return Err(MlError::InferenceError(format!(
            "output vector has {} entries but the label set has {}",
            probabilities.len(),
            catalog.len()
        )));
    }

    let classifications: Classifications = ranked(probabilities)
        .into_iter()
        .take(k)
        .filter_map(|(index, probability)| {
            catalog.by_index(index).map(|class| Classification {
                index,
                label: class.label.clone(),
                probability,
            })
        })
        .collect();

    debug!("classified output vector: {:?}", classifications);

    Ok(classifications)
}

pub trait NdArrayTensor<S, T, D> {
    /// [Softmax](https://en.wikipedia.org/wiki/Softmax_function) along `axis`.
    fn softmax(&self, axis: Axis) -> Array<T, D>
    where
        D: ndarray::RemoveAxis,
        S: ndarray::RawData + ndarray::Data + ndarray::RawData<Elem = T>,
        <S as ndarray::RawData>::Elem: std::clone::Clone,
        T: ndarray::NdFloat + std::ops::SubAssign + std::ops::DivAssign;
}

impl<S, T, D> NdArrayTensor<S, T, D> for ArrayBase<S, D>
where
    D: ndarray::RemoveAxis,
    S: ndarray::RawData + ndarray::Data + ndarray::RawData<Elem = T>,
    <S as ndarray::RawData>::Elem: std::clone::Clone,
    T: ndarray::NdFloat + std::ops::SubAssign + std::ops::DivAssign,
{
    fn softmax(&self, axis: Axis) -> Array<T, D> {
        let mut new_array: Array<T, D> = self.to_owned();
        // shift by the maximum so large logits do not overflow exp()
        let max = new_array
            .fold_axis(axis, T::neg_infinity(), |a, b| (*a).max(*b))
            .insert_axis(axis);
        new_array -= &max;
        new_array.map_inplace(|v| *v = v.exp());
        let sum = new_array.sum_axis(axis).insert_axis(axis);
        new_array /= &sum;

        new_array
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn softmax_sums_to_one_and_keeps_order() {
        let probabilities = softmax(&[1.0, 3.0, 2.0, -4.0, 0.0, 0.5, 1000.0]);

        assert!((probabilities.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert_eq!(arg_max(&probabilities).unwrap().class_index, 6);
        assert!(probabilities.iter().all(|p| p.is_finite()));
    }

    #[test]
    fn arg_max_prefers_first_of_equal_scores() {
        let prediction = arg_max(&[0.1, 0.4, 0.4, 0.1]).unwrap();

        assert_eq!(prediction.class_index, 1);
        assert!((prediction.confidence - 0.4).abs() < f32::EPSILON);
        assert_eq!(arg_max(&[]), None);
    }

    #[rstest]
    #[case::logits(vec![2.0, 1.0, -1.0])]
    #[case::short(vec![0.2, 0.2, 0.2])]
    #[case::negative(vec![1.2, -0.2])]
    #[case::nan(vec![f32::NAN, 1.0])]
    fn rejects_vectors_that_are_not_distributions(#[case] output: Vec<f32>) {
        assert!(matches!(
            check_probabilities(&output),
            Err(MlError::InferenceError(_))
        ));
    }

    #[test]
    fn accepts_distribution_within_tolerance() {
        assert!(check_probabilities(&[0.1, 0.2, 0.3, 0.4 + 1e-4]).is_ok());
    }

    #[test]
    fn ranked_sorts_descending() {
        let order: Vec<usize> = ranked(&[0.1, 0.6, 0.05, 0.25])
            .into_iter()
            .map(|(i, _)| i)
            .collect();

        assert_eq!(order, vec![1, 3, 0, 2]);
    }

    #[test]
    fn classify_attaches_catalog_labels() {
        let catalog = Catalog::builtin().unwrap();
        let output = [0.01, 0.02, 0.02, 0.9, 0.02, 0.02, 0.01];

        let top = classify(&output, &catalog, 2).unwrap();

        assert_eq!(top.len(), 2);
        assert_eq!(top[0].label, "Healthy Apple");
        assert_eq!(top[0].index, 3);
        assert!(classify(&output[..6], &catalog, 2).is_err());
    }
}
