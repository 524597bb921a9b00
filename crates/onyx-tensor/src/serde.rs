use crate::{dense::DenseTensor, element::TensorElement, shape::StrideOrder, TensorError};

use serde::ser::SerializeStruct;
use serde::Deserialize;

impl<T> serde::Serialize for DenseTensor<T>
where
    T: TensorElement + serde::Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("DenseTensor", 4)?;
        state.serialize_field("data", &self.to_vec())?;
        state.serialize_field("shape", &self.shape)?;
        state.serialize_field("strides", &self.strides)?;
        state.serialize_field("order", &self.order)?;
        state.end()
    }
}

impl<'de, T> serde::Deserialize<'de> for DenseTensor<T>
where
    T: TensorElement + serde::Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct TensorData<T> {
            data: Vec<T>,
            shape: Vec<usize>,
            strides: Vec<usize>,
            #[serde(default)]
            order: StrideOrder,
        }

        let TensorData {
            data,
            shape,
            strides,
            order,
        } = TensorData::deserialize(deserializer)?;

        let tensor = DenseTensor::from_shape_vec_with_order(&shape, data, order)
            .map_err(|e: TensorError| serde::de::Error::custom(e.to_string()))?;

        if tensor.strides != strides {
            return Err(serde::de::Error::custom("Invalid strides"));
        }

        Ok(tensor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TensorAccess;

    #[test]
    fn test_serde() -> Result<(), Box<dyn std::error::Error>> {
        let data = vec![1, 2, 3, 4, 5, 6];
        let tensor = DenseTensor::<u8>::from_shape_vec(&[2, 3], data)?;
        let serialized = serde_json::to_string(&tensor)?;
        let deserialized: DenseTensor<u8> = serde_json::from_str(&serialized)?;
        assert_eq!(tensor.to_vec(), deserialized.to_vec());
        assert_eq!(deserialized.shape(), &[2, 3]);
        Ok(())
    }

    #[test]
    fn test_serde_rejects_bad_strides() {
        let json = r#"{"data":[1.0,2.0],"shape":[2],"strides":[2]}"#;
        let res: Result<DenseTensor<f32>, _> = serde_json::from_str(json);
        assert!(res.is_err());
    }
}
