use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use crate::common::{PunchError, Result};

/// Length of every face embedding produced by the recognition network.
pub const DESCRIPTOR_LEN: usize = 128;

/// One face's embedding. Immutable once produced; cloning shares storage.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct FaceDescriptor {
    values: Arc<[f32]>,
}

impl FaceDescriptor {
    pub fn new(values: Vec<f32>) -> Result<Self> {
        if values.len() != DESCRIPTOR_LEN {
            return Err(PunchError::InvalidInput(format!(
                "Face descriptor must have {} values, got {}",
                DESCRIPTOR_LEN,
                values.len()
            )));
        }
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(PunchError::InvalidInput(format!(
                "Face descriptor value at index {} is not finite",
                index
            )));
        }
        Ok(Self { values: values.into() })
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Flat JSON numeric array, the form stored on the user profile.
    pub fn to_json(&self) -> String {
        // Serializing a slice of finite floats cannot fail.
        serde_json::to_string(&*self.values).unwrap_or_else(|_| "[]".to_string())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let trimmed = json.trim();
        if trimmed.is_empty() {
            return Err(PunchError::InvalidInput("Face descriptor is empty".to_string()));
        }
        let values: Vec<f32> = serde_json::from_str(trimmed)
            .map_err(|e| PunchError::InvalidInput(format!("Face descriptor is not a numeric array: {}", e)))?;
        Self::new(values)
    }
}

impl TryFrom<Vec<f32>> for FaceDescriptor {
    type Error = PunchError;

    fn try_from(values: Vec<f32>) -> Result<Self> {
        Self::new(values)
    }
}

impl From<FaceDescriptor> for Vec<f32> {
    fn from(descriptor: FaceDescriptor) -> Self {
        descriptor.values.to_vec()
    }
}

impl fmt::Debug for FaceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let head: Vec<String> = self.values.iter().take(4).map(|v| format!("{:.3}", v)).collect();
        write!(f, "FaceDescriptor([{}, ...; {}])", head.join(", "), self.values.len())
    }
}
