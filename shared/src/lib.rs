use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

/// Diagnostic categories the OCT classifier predicts. The discriminant is the
/// index of the class in the model's output vector.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum ClassLabel {
    Cnv = 0,
    Dme = 1,
    Drusen = 2,
    Normal = 3,
}

impl ClassLabel {
    pub const COUNT: usize = 4;

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(ClassLabel::Cnv),
            1 => Some(ClassLabel::Dme),
            2 => Some(ClassLabel::Drusen),
            3 => Some(ClassLabel::Normal),
            _ => None,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// One entry of the `/predict-api` response array.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ApiPrediction {
    pub image_id: usize,
    pub class_label: ClassLabel,
    pub probability: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ApiFailure {
    pub image_id: usize,
    pub filename: Option<String>,
    pub error: String,
}

/// Error body returned by the JSON API. `failures` and `results` are only
/// present when a batch was partially processed.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ApiErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ApiFailure>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<ApiPrediction>,
}

impl ApiErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            failures: Vec::new(),
            results: Vec::new(),
        }
    }
}
