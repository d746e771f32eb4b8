//! In-process collaborators for tests.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use bytes::Bytes;
use opendal::{Operator, services::Memory};
use poem::{
    IntoResponse, Request, Server,
    http::StatusCode,
    listener::{Acceptor, Listener, TcpListener},
    web::Json,
};

use crate::{
    handlers::AppState,
    language::{Sentiment, SentimentAnalyzer},
    records::{RecordStore, StoredRecord},
    storage::{ObjectStore, Storage, StoredObject},
    vision::{FaceAnnotation, FaceDetector, Likelihood},
};

pub fn memory_storage(bucket: &str) -> Storage {
    let operator = Operator::new(Memory::default()).unwrap().finish();

    Storage::new(operator, bucket, "https://storage.googleapis.com").unwrap()
}

pub fn faces(likelihoods: &[Likelihood]) -> Vec<FaceAnnotation> {
    likelihoods
        .iter()
        .map(|&joy_likelihood| FaceAnnotation { joy_likelihood })
        .collect()
}

#[derive(Default)]
pub struct MemoryRecordStore {
    records: Mutex<Vec<(String, StoredRecord)>>,
    queried_kinds: Mutex<Vec<String>>,
}

impl MemoryRecordStore {
    pub fn records(&self, kind: &str) -> Vec<StoredRecord> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|(record_kind, _)| record_kind == kind)
            .map(|(_, record)| record.clone())
            .collect()
    }

    pub fn queried_kinds(&self) -> Vec<String> {
        self.queried_kinds.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl RecordStore for MemoryRecordStore {
    async fn put(
        &self,
        kind: &str,
        name: &str,
        attributes: serde_json::Value,
    ) -> anyhow::Result<()> {
        let mut records = self.records.lock().unwrap();

        match records
            .iter_mut()
            .find(|(record_kind, record)| record_kind == kind && record.name == name)
        {
            Some((_, record)) => record.attributes = attributes,
            None => records.push((
                kind.to_string(),
                StoredRecord {
                    name: name.to_string(),
                    attributes,
                },
            )),
        }

        Ok(())
    }

    async fn query_all(&self, kind: &str) -> anyhow::Result<Vec<StoredRecord>> {
        self.queried_kinds.lock().unwrap().push(kind.to_string());

        Ok(self.records(kind))
    }
}

/// Answers each detection with the next queued result, and with no faces
/// once the queue is drained.
#[derive(Default)]
pub struct QueuedFaceDetector {
    results: Mutex<VecDeque<anyhow::Result<Vec<FaceAnnotation>>>>,
    calls: AtomicUsize,
}

impl QueuedFaceDetector {
    pub fn new(results: impl IntoIterator<Item = anyhow::Result<Vec<FaceAnnotation>>>) -> Self {
        Self {
            results: Mutex::new(results.into_iter().collect()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl FaceDetector for QueuedFaceDetector {
    async fn detect_faces(&self, _source_uri: &str) -> anyhow::Result<Vec<FaceAnnotation>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

pub struct FixedSentimentAnalyzer {
    pub score: f32,
    pub requested_uris: Mutex<Vec<String>>,
}

impl FixedSentimentAnalyzer {
    pub fn new(score: f32) -> Self {
        Self {
            score,
            requested_uris: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl SentimentAnalyzer for FixedSentimentAnalyzer {
    async fn analyze_sentiment(&self, source_uri: &str) -> anyhow::Result<Sentiment> {
        self.requested_uris
            .lock()
            .unwrap()
            .push(source_uri.to_string());

        Ok(Sentiment {
            score: self.score,
            magnitude: self.score.abs(),
        })
    }
}

pub struct FailingObjectStore;

#[async_trait::async_trait]
impl ObjectStore for FailingObjectStore {
    async fn put(
        &self,
        name: &str,
        _bytes: Bytes,
        _content_type: Option<&str>,
    ) -> anyhow::Result<StoredObject> {
        anyhow::bail!("bucket unavailable while writing {name}")
    }
}

pub struct FailingSentimentAnalyzer;

#[async_trait::async_trait]
impl SentimentAnalyzer for FailingSentimentAnalyzer {
    async fn analyze_sentiment(&self, source_uri: &str) -> anyhow::Result<Sentiment> {
        anyhow::bail!("language quota exceeded for {source_uri}")
    }
}

/// A request received by [`ApiServer`].
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub path: String,
    pub query: HashMap<String, String>,
    pub body: serde_json::Value,
}

/// A local HTTP server answering every request with the same JSON reply.
pub struct ApiServer {
    pub endpoint: String,
    requests: Arc<Mutex<Vec<ApiRequest>>>,
}

impl ApiServer {
    pub async fn start(status: StatusCode, reply: serde_json::Value) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let received = requests.clone();

        let api = poem::endpoint::make(move |req: Request| {
            let received = received.clone();
            let reply = reply.clone();

            async move {
                let path = req.uri().path().to_string();
                let query = req.params::<HashMap<String, String>>().unwrap_or_default();
                let body = req
                    .into_body()
                    .into_json::<serde_json::Value>()
                    .await
                    .unwrap_or_default();

                received.lock().unwrap().push(ApiRequest { path, query, body });

                Json(reply).with_status(status)
            }
        });

        let acceptor = TcpListener::bind("127.0.0.1:0")
            .into_acceptor()
            .await
            .unwrap();
        let addr = *acceptor.local_addr()[0].0.as_socket_addr().unwrap();

        tokio::spawn(Server::new_with_acceptor(acceptor).run(api));

        Self {
            endpoint: format!("http://{addr}"),
            requests,
        }
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }
}

/// Every collaborator of the application, kept around for assertions.
pub struct Harness {
    pub storage: Arc<Storage>,
    pub faces: Arc<QueuedFaceDetector>,
    pub sentiment: Arc<FixedSentimentAnalyzer>,
    pub records: Arc<MemoryRecordStore>,
}

impl Harness {
    pub fn new(faces: QueuedFaceDetector, score: f32) -> Self {
        Self {
            storage: Arc::new(memory_storage("photos")),
            faces: Arc::new(faces),
            sentiment: Arc::new(FixedSentimentAnalyzer::new(score)),
            records: Arc::new(MemoryRecordStore::default()),
        }
    }

    pub fn state(&self) -> AppState {
        AppState {
            storage: self.storage.clone(),
            faces: self.faces.clone(),
            sentiment: self.sentiment.clone(),
            records: self.records.clone(),
        }
    }
}
