use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use parking_lot::Mutex;
use refdata::ReferenceData;
use refdata::config::default_private_networks;
use refdata::source::{MemoryData, MemorySource};
use refdata::types::{Campaign, CampaignStatus, IpRange, Operator, PrefixEntry};
use std::convert::Infallible;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub query: String,
    pub body: String,
}

type Responder = dyn Fn(&RecordedRequest) -> Option<(u16, String)> + Send + Sync;

/// In-process HTTP server standing in for the collaborator service. Every
/// request is recorded; the responder picks a status and JSON body, `None`
/// answers 404.
pub struct TestCollaboratorServer {
    port: u16,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestCollaboratorServer {
    pub async fn spawn<F>(responder: F) -> Self
    where
        F: Fn(&RecordedRequest) -> Option<(u16, String)> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let responder: Arc<Responder> = Arc::new(responder);
        let requests = Arc::new(Mutex::new(Vec::new()));

        let server_requests = requests.clone();
        let handle = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let responder = responder.clone();
                let requests = server_requests.clone();

                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<Incoming>| {
                        let responder = responder.clone();
                        let requests = requests.clone();
                        async move {
                            let (parts, body) = req.into_parts();
                            let body = body.collect().await.unwrap().to_bytes();
                            let recorded = RecordedRequest {
                                method: parts.method,
                                path: parts.uri.path().to_string(),
                                query: parts.uri.query().unwrap_or_default().to_string(),
                                body: String::from_utf8_lossy(&body).into_owned(),
                            };
                            let answer = responder(&recorded);
                            requests.lock().push(recorded);

                            let response = match answer {
                                Some((status, body)) => Response::builder()
                                    .status(status)
                                    .header("content-type", "application/json")
                                    .body(Full::new(Bytes::from(body)))
                                    .unwrap(),
                                None => Response::builder()
                                    .status(StatusCode::NOT_FOUND)
                                    .body(Full::new(Bytes::new()))
                                    .unwrap(),
                            };
                            Ok::<_, Infallible>(response)
                        }
                    });
                    let _ = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        TestCollaboratorServer {
            port,
            requests,
            handle,
        }
    }

    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}/", self.port)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }
}

impl Drop for TestCollaboratorServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub fn campaign(id: u64, link: &str, hash: &str) -> Campaign {
    Campaign {
        id,
        link: link.into(),
        hash: hash.into(),
        welcome_page_id: 10,
        success_page_id: 11,
        error_page_id: 12,
        can_auto_click: true,
        status: CampaignStatus::Active,
        service_code: Some("svc".into()),
    }
}

pub const SUMMER_HASH: &str = "5f2b8c9d0e1a4b3c6d7e8f9a0b1c2d3e";
pub const WINTER_HASH: &str = "0a1b2c3d4e5f60718293a4b5c6d7e8f9";

/// Reference data with one operator (100, country 92) owning 41.2.0.0/16 and
/// prefix 92300, plus two active campaigns.
pub async fn reference_data() -> ReferenceData {
    let source = MemorySource::new(MemoryData {
        ip_ranges: vec![IpRange {
            id: 1,
            operator_code: 100,
            country_code: 92,
            ip_from: Ipv4Addr::new(41, 2, 0, 0),
            ip_to: Ipv4Addr::new(41, 2, 255, 255),
            msisdn_headers: vec!["X-Up-Calling-Line-Id".into()],
        }],
        prefixes: vec![PrefixEntry {
            prefix: "92300".into(),
            operator_code: 100,
        }],
        operators: vec![Operator {
            code: 100,
            name: "Jazz".into(),
            rate_limit: 10,
            country_code: Some(92),
            settings: serde_json::Value::Null,
        }],
        campaigns: vec![
            campaign(1, "summer-promo", SUMMER_HASH),
            campaign(2, "winter-promo", WINTER_HASH),
        ],
        private_networks: None,
    });

    let refdata = ReferenceData::new(Arc::new(source), default_private_networks());
    refdata.reload_all().await.unwrap();
    refdata
}
