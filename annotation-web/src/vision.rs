use anyhow::Context;
use serde::Deserialize;
use serde_json::json;

pub const VISION_ENDPOINT: &str = "https://vision.googleapis.com";

/// How likely it is that a face shows an emotion.
///
/// The variants are declared in ordinal order (0 to 5).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawLikelihood")]
pub enum Likelihood {
    #[default]
    Unknown,
    VeryUnlikely,
    Unlikely,
    Possible,
    Likely,
    VeryLikely,
}

impl Likelihood {
    const ORDERED: [Likelihood; 6] = [
        Likelihood::Unknown,
        Likelihood::VeryUnlikely,
        Likelihood::Unlikely,
        Likelihood::Possible,
        Likelihood::Likely,
        Likelihood::VeryLikely,
    ];

    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        Self::ORDERED.get(ordinal as usize).copied()
    }

    /// The human-readable label stored in the Faces records.
    pub fn label(self) -> &'static str {
        match self {
            Likelihood::Unknown => "Unknown",
            Likelihood::VeryUnlikely => "Very Unlikely",
            Likelihood::Unlikely => "Unlikely",
            Likelihood::Possible => "Possible",
            Likelihood::Likely => "Likely",
            Likelihood::VeryLikely => "Very Likely",
        }
    }

    fn api_name(self) -> &'static str {
        match self {
            Likelihood::Unknown => "UNKNOWN",
            Likelihood::VeryUnlikely => "VERY_UNLIKELY",
            Likelihood::Unlikely => "UNLIKELY",
            Likelihood::Possible => "POSSIBLE",
            Likelihood::Likely => "LIKELY",
            Likelihood::VeryLikely => "VERY_LIKELY",
        }
    }
}

/// The API sends enum names by default, and ordinals when asked for
/// integer enum encoding.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawLikelihood {
    Ordinal(u8),
    Name(String),
}

impl TryFrom<RawLikelihood> for Likelihood {
    type Error = String;

    fn try_from(raw: RawLikelihood) -> Result<Self, Self::Error> {
        match raw {
            RawLikelihood::Ordinal(ordinal) => Likelihood::from_ordinal(ordinal)
                .ok_or_else(|| format!("likelihood ordinal out of range: {ordinal}")),
            RawLikelihood::Name(name) => Self::ORDERED
                .into_iter()
                .find(|likelihood| likelihood.api_name() == name)
                .ok_or_else(|| format!("unknown likelihood: {name}")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceAnnotation {
    #[serde(default)]
    pub joy_likelihood: Likelihood,
}

/// The joy label of an image: the first detected face wins, and an image
/// without faces is "Unknown".
pub fn joy_label(faces: &[FaceAnnotation]) -> &'static str {
    match faces.first() {
        Some(face) => face.joy_likelihood.label(),
        None => "Unknown",
    }
}

#[async_trait::async_trait]
pub trait FaceDetector: Send + Sync {
    async fn detect_faces(&self, source_uri: &str) -> anyhow::Result<Vec<FaceAnnotation>>;
}

#[derive(Debug, Deserialize)]
struct AnnotateImagesResponse {
    #[serde(default)]
    responses: Vec<AnnotateImageResponse>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateImageResponse {
    #[serde(default)]
    face_annotations: Vec<FaceAnnotation>,
    error: Option<ApiStatus>,
}

#[derive(Debug, Deserialize)]
struct ApiStatus {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

impl AnnotateImagesResponse {
    fn into_faces(self) -> anyhow::Result<Vec<FaceAnnotation>> {
        let response = self.responses.into_iter().next().unwrap_or_default();

        if let Some(ApiStatus { code, message }) = response.error {
            anyhow::bail!("Face detection failed ({code}): {message}");
        }

        Ok(response.face_annotations)
    }
}

/// Face detection through the Cloud Vision REST API.
#[derive(Clone)]
pub struct VisionClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl VisionClient {
    pub fn new(client: reqwest::Client, endpoint: &str, api_key: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl FaceDetector for VisionClient {
    #[tracing::instrument(skip(self))]
    async fn detect_faces(&self, source_uri: &str) -> anyhow::Result<Vec<FaceAnnotation>> {
        let body = json!({
            "requests": [{
                "image": { "source": { "gcsImageUri": source_uri } },
                "features": [{ "type": "FACE_DETECTION" }],
            }]
        });

        let response = self
            .client
            .post(format!("{}/v1/images:annotate", self.endpoint))
            .query(&[("key", &self.api_key)])
            .json(&body)
            .send()
            .await
            .context("Failed to call the Vision API")?
            .error_for_status()
            .context("The Vision API rejected the face detection request")?
            .json::<AnnotateImagesResponse>()
            .await
            .context("Failed to decode the Vision API response")?;

        let faces = response.into_faces()?;
        tracing::info!("Detected {} faces", faces.len());

        Ok(faces)
    }
}
