use indexmap::IndexMap;
use log::debug;
use ndarray::{Array1, Array2, ArrayD, Ix1, Ix2};

use crate::{
    MlErr, Result,
    arch::layers::Dense,
    error::BindMismatch,
};

/// A dense parameter tensor, rank 1 for biases and rank 2 for weights.
pub type Tensor = ArrayD<f32>;

/// The named parameters of a model, kept in insertion order.
///
/// The order matters: the first rank 2 tensor is the input layer's weight matrix, which is how
/// a model's input width is recovered from a serialized artifact.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterMapping {
    params: IndexMap<String, Tensor>,
}

impl ParameterMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a tensor under `name`, returning the previous one if the name was taken. A
    /// replaced entry keeps its original position.
    pub fn insert<S: Into<String>>(&mut self, name: S, tensor: Tensor) -> Option<Tensor> {
        self.params.insert(name.into(), tensor)
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.params.get(name)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Tensor)> {
        self.params.iter().map(|(name, t)| (name.as_str(), t))
    }

    /// Returns the first weight matrix in insertion order.
    pub fn first_weight(&self) -> Option<(&str, &Tensor)> {
        self.iter().find(|(_, t)| t.ndim() == 2)
    }

    /// Infers the input width of the model these parameters belong to from their order.
    ///
    /// # Returns
    /// The second dimension of the first weight matrix, or `None` if there is none.
    pub fn input_dim(&self) -> Option<usize> {
        self.first_weight().map(|(_, w)| w.shape()[1])
    }

    /// Returns the input width of the weight matrix stored under `name`, or `None` if there is
    /// no such parameter or it is not a matrix.
    pub fn width_of(&self, name: &str) -> Option<usize> {
        self.get(name)
            .filter(|w| w.ndim() == 2)
            .map(|w| w.shape()[1])
    }
}

impl<S: Into<String>> FromIterator<(S, Tensor)> for ParameterMapping {
    fn from_iter<I: IntoIterator<Item = (S, Tensor)>>(iter: I) -> Self {
        Self {
            params: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Collects the parameters of a sequence of prefixed dense layers into a mapping, as
/// `{prefix}.weight` followed by `{prefix}.bias` for each layer.
pub(crate) fn export_dense<'m, I>(layers: I) -> ParameterMapping
where
    I: IntoIterator<Item = (String, &'m Dense)>,
{
    let mut params = ParameterMapping::new();

    for (prefix, layer) in layers {
        params.insert(format!("{prefix}.weight"), layer.weights().to_owned().into_dyn());
        params.insert(format!("{prefix}.bias"), layer.bias().to_owned().into_dyn());
    }

    params
}

/// Binds `params` onto a sequence of prefixed dense layers.
///
/// Every parameter must name an existing slot with the exact slot shape, and every slot must be
/// provided. Nothing is written unless the whole mapping binds.
///
/// # Arguments
/// * `params` - The parameters to bind.
/// * `layers` - The layers, each with the prefix its slots are named after.
///
/// # Returns
/// An error naming the first offending parameter, if any.
pub(crate) fn bind_dense<'m, I>(params: &ParameterMapping, layers: I) -> Result<()>
where
    I: IntoIterator<Item = (String, &'m mut Dense)>,
{
    let layers: Vec<_> = layers.into_iter().collect();
    let mut staged: Vec<(Option<Array2<f32>>, Option<Array1<f32>>)> =
        vec![(None, None); layers.len()];

    for (name, tensor) in params.iter() {
        let (i, is_weight) = locate(&layers, name).ok_or_else(|| MlErr::ParameterBindMismatch {
            name: name.to_string(),
            kind: BindMismatch::Unexpected,
        })?;
        let layer = &layers[i].1;

        if is_weight {
            let w = check_shape(name, tensor, &layer.weight_shape())?
                .into_dimensionality::<Ix2>()
                .map_err(|_| shape_mismatch(name, tensor, &layer.weight_shape()))?;
            staged[i].0 = Some(w);
        } else {
            let b = check_shape(name, tensor, &layer.bias_shape())?
                .into_dimensionality::<Ix1>()
                .map_err(|_| shape_mismatch(name, tensor, &layer.bias_shape()))?;
            staged[i].1 = Some(b);
        }
    }

    let staged = layers
        .iter()
        .zip(staged)
        .map(|((prefix, _), (w, b))| {
            let w = w.ok_or_else(|| missing(format!("{prefix}.weight")))?;
            let b = b.ok_or_else(|| missing(format!("{prefix}.bias")))?;
            Ok((w, b))
        })
        .collect::<Result<Vec<_>>>()?;

    let nlayers = layers.len();
    for ((_, layer), (w, b)) in layers.into_iter().zip(staged) {
        layer.set_params(w, b);
    }
    debug!(layers = nlayers, tensors = params.len(); "bound parameters");

    Ok(())
}

/// Finds the layer a parameter name belongs to and whether it names the weight or the bias.
fn locate(layers: &[(String, &mut Dense)], name: &str) -> Option<(usize, bool)> {
    let (prefix, leaf) = name.rsplit_once('.')?;
    let is_weight = match leaf {
        "weight" => true,
        "bias" => false,
        _ => return None,
    };

    layers
        .iter()
        .position(|(p, _)| p == prefix)
        .map(|i| (i, is_weight))
}

fn check_shape(name: &str, tensor: &Tensor, expected: &[usize]) -> Result<Tensor> {
    if tensor.shape() != expected {
        return Err(shape_mismatch(name, tensor, expected));
    }

    Ok(tensor.clone())
}

fn shape_mismatch(name: &str, tensor: &Tensor, expected: &[usize]) -> MlErr {
    MlErr::ParameterBindMismatch {
        name: name.to_string(),
        kind: BindMismatch::Shape {
            got: tensor.shape().to_vec(),
            expected: expected.to_vec(),
        },
    }
}

fn missing(name: String) -> MlErr {
    MlErr::ParameterBindMismatch {
        name,
        kind: BindMismatch::Missing,
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{ArrayD, IxDyn};

    use super::*;

    fn tensor(shape: &[usize], fill: f32) -> Tensor {
        ArrayD::from_elem(IxDyn(shape), fill)
    }

    #[test]
    fn keeps_insertion_order() {
        let params: ParameterMapping = [
            ("b.bias", tensor(&[2], 0.)),
            ("a.weight", tensor(&[2, 5], 0.)),
            ("a.bias", tensor(&[2], 0.)),
        ]
        .into_iter()
        .collect();

        let names: Vec<_> = params.names().collect();
        assert_eq!(names, ["b.bias", "a.weight", "a.bias"]);
        assert_eq!(params.first_weight().map(|(n, _)| n), Some("a.weight"));
        assert_eq!(params.input_dim(), Some(5));
    }

    #[test]
    fn width_of_ignores_order() {
        let params: ParameterMapping = [
            ("network.2.weight", tensor(&[4, 8], 0.)),
            ("network.0.weight", tensor(&[8, 3], 0.)),
            ("network.0.bias", tensor(&[8], 0.)),
        ]
        .into_iter()
        .collect();

        assert_eq!(params.input_dim(), Some(8));
        assert_eq!(params.width_of("network.0.weight"), Some(3));
        assert_eq!(params.width_of("network.0.bias"), None);
        assert_eq!(params.width_of("network.4.weight"), None);
    }

    #[test]
    fn input_dim_needs_a_matrix() {
        let params: ParameterMapping = [("a.bias", tensor(&[2], 0.))].into_iter().collect();
        assert_eq!(params.input_dim(), None);
        assert_eq!(ParameterMapping::new().input_dim(), None);
    }

    #[test]
    fn bind_is_all_or_nothing() {
        let mut dense = Dense::new((3, 2), None).unwrap();
        let params: ParameterMapping = [
            ("l.weight", tensor(&[2, 3], 1.)),
            ("l.bias", tensor(&[3], 1.)),
        ]
        .into_iter()
        .collect();

        let err = bind_dense(&params, [("l".to_string(), &mut dense)]).unwrap_err();
        assert_eq!(
            err,
            MlErr::ParameterBindMismatch {
                name: "l.bias".into(),
                kind: BindMismatch::Shape {
                    got: vec![3],
                    expected: vec![2],
                },
            }
        );
        assert!(dense.weights().iter().all(|&w| w == 0.));
    }

    #[test]
    fn bind_then_export_reproduces_mapping() {
        let mut dense = Dense::new((3, 2), None).unwrap();
        let params: ParameterMapping = [
            ("l.weight", tensor(&[2, 3], 0.5)),
            ("l.bias", tensor(&[2], -1.)),
        ]
        .into_iter()
        .collect();

        bind_dense(&params, [("l".to_string(), &mut dense)]).unwrap();
        assert_eq!(export_dense([("l".to_string(), &dense)]), params);
    }

    #[test]
    fn bind_reports_unexpected_and_missing() {
        let mut dense = Dense::new((3, 2), None).unwrap();

        let unexpected: ParameterMapping = [("l.scale", tensor(&[2], 1.))].into_iter().collect();
        let err = bind_dense(&unexpected, [("l".to_string(), &mut dense)]).unwrap_err();
        assert!(matches!(
            err,
            MlErr::ParameterBindMismatch { ref name, kind: BindMismatch::Unexpected } if name == "l.scale"
        ));

        let partial: ParameterMapping = [("l.weight", tensor(&[2, 3], 1.))].into_iter().collect();
        let err = bind_dense(&partial, [("l".to_string(), &mut dense)]).unwrap_err();
        assert!(matches!(
            err,
            MlErr::ParameterBindMismatch { ref name, kind: BindMismatch::Missing } if name == "l.bias"
        ));
    }
}
