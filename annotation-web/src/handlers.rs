use std::sync::Arc;

use anyhow::Context as _;
use bytes::Bytes;
use chrono::Utc;
use poem::{
    Endpoint, EndpointExt, IntoResponse, Response, Route, get, handler,
    http::{StatusCode, header},
    web::{Data, Html, Multipart},
};

use crate::{
    language::SentimentAnalyzer,
    page,
    records::{self, FaceRecord, RecordStore, SentimentRecord},
    storage::ObjectStore,
    vision::{self, FaceDetector},
};

/// The collaborators shared by every request.
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn ObjectStore>,
    pub faces: Arc<dyn FaceDetector>,
    pub sentiment: Arc<dyn SentimentAnalyzer>,
    pub records: Arc<dyn RecordStore>,
}

pub fn app(state: AppState) -> impl Endpoint {
    Route::new()
        .at("/", get(homepage))
        .at("/upload_photo", get(upload_photo).post(upload_photo))
        .at("/upload_text", get(upload_text).post(upload_text))
        .data(state)
        .catch_all_error(server_error)
}

/// Keep the whole cause chain in the message shown to the user.
fn internal_error(err: anyhow::Error) -> poem::Error {
    poem::Error::from_string(format!("{err:#}"), StatusCode::INTERNAL_SERVER_ERROR)
}

fn redirect_home() -> Response {
    Response::builder()
        .status(StatusCode::FOUND)
        .header(header::LOCATION, "/")
        .finish()
}

#[handler]
async fn homepage(Data(state): Data<&AppState>) -> poem::Result<Html<String>> {
    let faces = records::query_records::<FaceRecord>(state.records.as_ref())
        .await
        .map_err(internal_error)?;
    let sentiments = records::query_records::<SentimentRecord>(state.records.as_ref())
        .await
        .map_err(internal_error)?;

    Ok(Html(page::render_home(&faces, &sentiments)))
}

#[handler]
async fn upload_photo(Data(state): Data<&AppState>, multipart: Multipart) -> poem::Result<Response> {
    let file = UploadedFile::from_multipart(multipart)
        .await
        .map_err(internal_error)?;

    annotate_photo(state, file).await.map_err(internal_error)?;

    Ok(redirect_home())
}

#[handler]
async fn upload_text(Data(state): Data<&AppState>, multipart: Multipart) -> poem::Result<Response> {
    let file = UploadedFile::from_multipart(multipart)
        .await
        .map_err(internal_error)?;

    annotate_text(state, file).await.map_err(internal_error)?;

    Ok(redirect_home())
}

async fn server_error(err: poem::Error) -> Response {
    // routing errors are answered as they are
    if err.status() == StatusCode::NOT_FOUND || err.status() == StatusCode::METHOD_NOT_ALLOWED {
        return err.into_response();
    }

    tracing::error!("An error occurred during a request: {err:?}");

    Html(page::render_error(&err.to_string()))
        .with_status(StatusCode::INTERNAL_SERVER_ERROR)
        .into_response()
}

/// The `file` field of an upload form.
#[derive(Debug)]
struct UploadedFile {
    name: String,
    content_type: Option<String>,
    bytes: Bytes,
}

impl UploadedFile {
    async fn from_multipart(mut multipart: Multipart) -> anyhow::Result<Self> {
        while let Some(field) = multipart
            .next_field()
            .await
            .context("Failed to parse the upload form")?
        {
            if field.name() != Some("file") {
                continue;
            }

            let name = field
                .file_name()
                .filter(|name| !name.is_empty())
                .map(ToString::to_string)
                .context("The uploaded file has no name")?;
            let content_type = field.content_type().map(ToString::to_string);
            let bytes = field
                .bytes()
                .await
                .context("Failed to read the uploaded file")?;

            return Ok(Self {
                name,
                content_type,
                bytes: Bytes::from(bytes),
            });
        }

        anyhow::bail!("The upload form has no `file` field")
    }
}

#[tracing::instrument(skip_all, fields(name = %file.name, size = file.bytes.len(), content_type = ?file.content_type))]
async fn annotate_photo(state: &AppState, file: UploadedFile) -> anyhow::Result<()> {
    let object = state
        .storage
        .put(&file.name, file.bytes, file.content_type.as_deref())
        .await?;

    let faces = state.faces.detect_faces(&object.source_uri).await?;
    let joy = vision::joy_label(&faces);
    tracing::info!("Joy likelihood of {}: {joy}", object.name);

    let record = FaceRecord {
        blob_name: object.name,
        image_public_url: object.public_url,
        timestamp: Utc::now(),
        joy: joy.to_string(),
    };

    records::put_record(state.records.as_ref(), &record).await
}

#[tracing::instrument(skip_all, fields(name = %file.name, size = file.bytes.len(), content_type = ?file.content_type))]
async fn annotate_text(state: &AppState, file: UploadedFile) -> anyhow::Result<()> {
    let object = state
        .storage
        .put(&file.name, file.bytes, file.content_type.as_deref())
        .await?;

    let sentiment = state.sentiment.analyze_sentiment(&object.source_uri).await?;

    let record = SentimentRecord {
        blob_name: object.name,
        image_public_url: object.public_url,
        timestamp: Utc::now(),
        sentiment: sentiment.score,
    };

    records::put_record(state.records.as_ref(), &record).await
}
