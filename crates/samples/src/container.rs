use ndarray::{Array2, Array3, Array4, ArrayD, Axis};

use geo::ArrayDataType;

use crate::{Error, Result};

/// Provenance of the samples in a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Description {
    ImageTiles,
    ImageRefTiles,
    Merged,
    FiniteValues,
    Other(String),
}

impl Description {
    pub fn as_str(&self) -> &str {
        match self {
            Description::ImageTiles => "IMAGE TILES",
            Description::ImageRefTiles => "IMAGE REF TILES",
            Description::Merged => "Merged",
            Description::FiniteValues => "finite values",
            Description::Other(desc) => desc,
        }
    }
}

impl From<&str> for Description {
    fn from(desc: &str) -> Self {
        match desc.trim_end_matches('\0').trim() {
            "IMAGE TILES" => Description::ImageTiles,
            "IMAGE REF TILES" => Description::ImageRefTiles,
            "Merged" => Description::Merged,
            "finite values" => Description::FiniteValues,
            other => Description::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for Description {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleLayout {
    /// `(n_samples, n_variables)`
    Tabular,
    /// `(n_samples, chip_height, chip_width, n_bands)`
    Chips,
}

/// A bundle of samples sharing their trailing dimensions, with optional reference chips
#[derive(Debug, Clone, PartialEq)]
pub struct SampleContainer {
    data: ArrayD<f64>,
    reference: Option<ArrayD<f64>>,
    description: Description,
    data_type: ArrayDataType,
}

impl SampleContainer {
    pub fn tabular(data: Array2<f64>, description: Description) -> Self {
        SampleContainer {
            data: data.into_dyn(),
            reference: None,
            description,
            data_type: ArrayDataType::Float64,
        }
    }

    /// Chip samples, the reference chips must have the same sample count and chip size
    pub fn chips(data: Array4<f64>, reference: Option<Array3<f64>>, description: Description) -> Result<Self> {
        Self::from_parts(data.into_dyn(), reference.map(|r| r.into_dyn()), description, ArrayDataType::Float64)
    }

    /// Validates the dimensions of the arrays
    pub fn from_parts(data: ArrayD<f64>, reference: Option<ArrayD<f64>>, description: Description, data_type: ArrayDataType) -> Result<Self> {
        match data.ndim() {
            2 => {
                if reference.is_some() {
                    return Err(Error::Configuration("Reference data is only supported for chip samples".to_string()));
                }
            }
            4 => {
                if let Some(reference) = &reference {
                    let shape = data.shape();
                    if reference.shape() != &shape[..3] {
                        return Err(Error::Configuration(format!(
                            "Reference shape {:?} does not match the sample shape {:?}",
                            reference.shape(),
                            shape
                        )));
                    }
                }
            }
            ndim => {
                return Err(Error::Configuration(format!(
                    "Samples must have 2 (tabular) or 4 (chips) dimensions, got {ndim}"
                )));
            }
        }

        Ok(SampleContainer {
            data,
            reference,
            description,
            data_type,
        })
    }

    pub fn layout(&self) -> SampleLayout {
        if self.data.ndim() == 4 {
            SampleLayout::Chips
        } else {
            SampleLayout::Tabular
        }
    }

    pub fn len(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The shape of a single sample
    pub fn trailing_shape(&self) -> &[usize] {
        &self.data.shape()[1..]
    }

    pub fn data(&self) -> &ArrayD<f64> {
        &self.data
    }

    pub fn reference(&self) -> Option<&ArrayD<f64>> {
        self.reference.as_ref()
    }

    pub fn description(&self) -> &Description {
        &self.description
    }

    /// The element type the samples were stored with
    pub fn data_type(&self) -> ArrayDataType {
        self.data_type
    }

    /// New container with the samples at the provided indexes, in the order of the indexes
    pub fn select(&self, indexes: &[usize]) -> Result<SampleContainer> {
        if let Some(&index) = indexes.iter().find(|&&i| i >= self.len()) {
            return Err(Error::InvalidArgument(format!(
                "Sample index {} out of range, container has {} samples",
                index,
                self.len()
            )));
        }

        Ok(SampleContainer {
            data: self.data.select(Axis(0), indexes),
            reference: self.reference.as_ref().map(|r| r.select(Axis(0), indexes)),
            description: self.description.clone(),
            data_type: self.data_type,
        })
    }

    /// Appends the samples of the containers in order.
    /// All containers need the same trailing shape and either all or none of them have reference data.
    pub fn concatenate(containers: &[SampleContainer], description: Description) -> Result<SampleContainer> {
        let first = containers
            .first()
            .ok_or_else(|| Error::Configuration("No sample containers to concatenate".to_string()))?;

        for (index, container) in containers.iter().enumerate().skip(1) {
            if container.trailing_shape() != first.trailing_shape() || container.data.ndim() != first.data.ndim() {
                return Err(Error::Configuration(format!(
                    "Sample shape of input {} {:?} does not match the shape of the first input {:?}",
                    index + 1,
                    container.trailing_shape(),
                    first.trailing_shape()
                )));
            }

            if container.reference.is_some() != first.reference.is_some() {
                return Err(Error::Configuration(format!(
                    "Input {} {} reference data, the first input {}",
                    index + 1,
                    if container.reference.is_some() { "has" } else { "has no" },
                    if first.reference.is_some() { "does" } else { "does not" },
                )));
            }
        }

        let views: Vec<_> = containers.iter().map(|c| c.data.view()).collect();
        let data = ndarray::concatenate(Axis(0), &views).map_err(|err| Error::Runtime(err.to_string()))?;

        let reference = if first.reference.is_some() {
            let views: Vec<_> = containers.iter().filter_map(|c| c.reference.as_ref().map(|r| r.view())).collect();
            Some(ndarray::concatenate(Axis(0), &views).map_err(|err| Error::Runtime(err.to_string()))?)
        } else {
            None
        };

        Ok(SampleContainer {
            data,
            reference,
            description,
            data_type: first.data_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{Array, IxDyn, array};

    use super::*;

    fn chips(n: usize, offset: f64) -> Result<SampleContainer> {
        let data = Array::from_shape_fn((n, 2, 2, 3), |(s, r, c, b)| offset + (s * 12 + r * 6 + c * 3 + b) as f64);
        let reference = Array::from_shape_fn((n, 2, 2), |(s, _, _)| offset + s as f64);
        SampleContainer::chips(data, Some(reference), Description::ImageRefTiles)
    }

    #[test]
    fn invalid_dimensions() {
        let data = ArrayD::<f64>::zeros(IxDyn(&[3, 2, 2]));
        assert!(matches!(
            SampleContainer::from_parts(data, None, Description::Merged, ArrayDataType::Float32),
            Err(Error::Configuration(_))
        ));

        let data = Array4::<f64>::zeros((3, 2, 2, 1));
        let reference = Array3::<f64>::zeros((3, 2, 3));
        assert!(SampleContainer::chips(data, Some(reference), Description::ImageRefTiles).is_err());
    }

    #[test]
    fn select_samples() -> Result<()> {
        let container = chips(4, 0.0)?;
        let selection = container.select(&[1, 3])?;
        assert_eq!(selection.len(), 2);
        assert_eq!(selection.data()[[0, 0, 0, 0]], 12.0);
        assert_eq!(selection.data()[[1, 1, 1, 2]], 36.0 + 11.0);
        assert_eq!(selection.reference().map(|r| r[[1, 0, 0]]), Some(3.0));
        assert!(container.select(&[4]).is_err());
        Ok(())
    }

    #[test]
    fn concatenate_containers() -> Result<()> {
        let merged = SampleContainer::concatenate(&[chips(2, 0.0)?, chips(3, 100.0)?], Description::Merged)?;
        assert_eq!(merged.len(), 5);
        assert_eq!(merged.layout(), SampleLayout::Chips);
        assert_eq!(merged.trailing_shape(), &[2, 2, 3]);
        assert_eq!(merged.data()[[2, 0, 0, 0]], 100.0);
        assert_eq!(merged.reference().map(|r| r[[4, 1, 1]]), Some(102.0));
        assert_eq!(merged.description(), &Description::Merged);
        Ok(())
    }

    #[test]
    fn concatenate_mismatching_shapes() -> Result<()> {
        let tabular = SampleContainer::tabular(array![[1.0, 2.0], [3.0, 4.0]], Description::FiniteValues);
        let wider = SampleContainer::tabular(array![[1.0, 2.0, 3.0]], Description::FiniteValues);
        assert!(matches!(
            SampleContainer::concatenate(&[tabular.clone(), wider], Description::Merged),
            Err(Error::Configuration(_))
        ));

        let without_reference = SampleContainer::chips(Array4::zeros((1, 2, 2, 3)), None, Description::ImageTiles)?;
        assert!(matches!(
            SampleContainer::concatenate(&[chips(1, 0.0)?, without_reference], Description::Merged),
            Err(Error::Configuration(_))
        ));

        assert!(SampleContainer::concatenate(&[], Description::Merged).is_err());
        Ok(())
    }

    #[test]
    fn description_strings() {
        assert_eq!(Description::from("IMAGE REF TILES"), Description::ImageRefTiles);
        assert_eq!(Description::from("finite values"), Description::FiniteValues);
        assert_eq!(Description::from("Merged\0\0\0"), Description::Merged);
        assert_eq!(Description::from("custom").as_str(), "custom");
    }
}
