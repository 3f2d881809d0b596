//! Loading of pretrained VGG16 convolution weights.
//!
//! The archive is a `.npz` file holding `{layer}/W` in `[kh, kw, in, out]` layout
//! and `{layer}/b` of shape `[out]` for each convolution layer.

use crate::common::*;

#[derive(Debug)]
pub struct Vgg16Weights {
    /// weight in `[out, in, kh, kw]` layout and bias per layer
    layers: HashMap<String, (Tensor, Tensor)>,
}

impl Vgg16Weights {
    pub fn open<P>(path: P) -> Fallible<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let entries = Tensor::read_npz(path)
            .map_err(|err| format_err!("cannot read weights {}: {}", path.display(), err))?;

        let mut weights = HashMap::new();
        let mut biases = HashMap::new();
        for (name, tensor) in entries {
            match name.rsplit_once('/') {
                Some((layer, "W")) => {
                    weights.insert(layer.to_string(), tensor);
                }
                Some((layer, "b")) => {
                    biases.insert(layer.to_string(), tensor);
                }
                _ => debug!("ignore entry {} in {}", name, path.display()),
            }
        }

        let layers = weights
            .into_iter()
            .map(|(layer, weight)| {
                let bias = biases
                    .remove(&layer)
                    .ok_or_else(|| format_err!("layer {} has no bias in the archive", layer))?;
                ensure!(
                    weight.dim() == 4,
                    "layer {}: expect a 4D kernel, but get shape {:?}",
                    layer,
                    weight.size()
                );
                let weight = weight
                    .permute(&[3, 2, 0, 1])
                    .contiguous()
                    .to_kind(Kind::Float);
                let bias = bias.to_kind(Kind::Float);
                Ok((layer, (weight, bias)))
            })
            .collect::<Fallible<HashMap<_, _>>>()?;

        info!("loaded {} layers from {}", layers.len(), path.display());
        Ok(Self { layers })
    }

    pub fn from_layers(layers: HashMap<String, (Tensor, Tensor)>) -> Self {
        Self { layers }
    }

    pub fn layer(&self, name: &str) -> Fallible<&(Tensor, Tensor)> {
        self.layers
            .get(name)
            .ok_or_else(|| format_err!("layer {} is missing in the pretrained weights", name))
    }

    /// Copies the named layers into the `{prefix}.{layer}.weight` and
    /// `{prefix}.{layer}.bias` variables of the var store.
    ///
    /// All shapes are checked before any variable is written.
    pub fn assign(&self, vs: &VarStore, prefix: &str, layers: &[&str]) -> Fallible<()> {
        let mut variables = vs.variables();

        let pairs = layers
            .iter()
            .map(|&layer| {
                let (weight, bias) = self.layer(layer)?;
                let targets = [("weight", weight), ("bias", bias)]
                    .iter()
                    .map(|&(suffix, value)| {
                        let key = format!("{}.{}.{}", prefix, layer, suffix);
                        let var = variables
                            .remove(&key)
                            .ok_or_else(|| format_err!("variable {} does not exist", key))?;
                        ensure!(
                            var.size() == value.size(),
                            "layer {}: pretrained {} has shape {:?}, but the model expects {:?}",
                            layer,
                            suffix,
                            value.size(),
                            var.size()
                        );
                        Ok((var, value))
                    })
                    .collect::<Fallible<Vec<_>>>()?;
                Ok(targets)
            })
            .collect::<Fallible<Vec<_>>>()?;

        tch::no_grad(|| {
            pairs
                .into_iter()
                .flatten()
                .for_each(|(mut var, value)| var.copy_(value));
        });

        debug!("assigned {} pretrained layers to {}", layers.len(), prefix);
        Ok(())
    }
}
