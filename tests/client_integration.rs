//! Client operations against a mock S3 server

use std::fs;
use std::time::Duration;

use s3cli::s3::{
    Bucket, DeleteResult, DeletionVisitor, ListingPage, ListingVisitor, S3Client, S3Error,
    Transport,
};
use tempfile::TempDir;
use wiremock::matchers::{
    body_string, header, header_exists, method, path, query_param, query_param_is_missing,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BUCKET_PATH: &str = "/test-bucket";

fn client_for(server: &MockServer) -> S3Client {
    let bucket = Bucket::new(
        "test",
        format!("{}{}", server.uri(), BUCKET_PATH),
        "us-east-1",
        "AKIDEXAMPLE",
        "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
    );
    let transport = Transport::new()
        .unwrap()
        .with_timeout(Duration::from_secs(5));
    S3Client::with_transport(bucket, transport)
}

fn list_xml(keys: &[&str]) -> String {
    let mut xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <ListBucketResult xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">\
         <Name>test-bucket</Name><KeyCount>{}</KeyCount>",
        keys.len()
    );
    for key in keys {
        xml.push_str(&format!(
            "<Contents><Key>{}</Key><Size>10</Size><StorageClass>STANDARD</StorageClass></Contents>",
            key
        ));
    }
    xml.push_str("</ListBucketResult>");
    xml
}

/// Records every page it sees
#[derive(Default)]
struct Collect {
    pages: Vec<Vec<String>>,
    stop_after: Option<usize>,
}

impl ListingVisitor for Collect {
    async fn visit_listing(&mut self, page: &ListingPage) -> bool {
        self.pages
            .push(page.items.iter().map(|item| item.key.clone()).collect());
        self.stop_after.map_or(true, |limit| self.pages.len() < limit)
    }
}

#[derive(Default)]
struct Record {
    results: Vec<DeleteResult>,
}

impl DeletionVisitor for Record {
    fn visit_deletion(&mut self, result: &DeleteResult) -> bool {
        self.results.push(result.clone());
        true
    }
}

async fn mount_page(server: &MockServer, start_after: Option<&str>, keys: &[&str]) {
    let mock = Mock::given(method("GET"))
        .and(path(BUCKET_PATH))
        .and(query_param("list-type", "2"))
        .and(query_param("max-keys", "2"))
        .and(query_param("prefix", "logs/"));
    let mock = match start_after {
        Some(cursor) => mock.and(query_param("start-after", cursor)),
        None => mock.and(query_param_is_missing("start-after")),
    };
    mock.respond_with(ResponseTemplate::new(200).set_body_string(list_xml(keys)))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_list_follows_start_after() {
    let server = MockServer::start().await;
    mount_page(&server, None, &["logs/a", "logs/b"]).await;
    mount_page(&server, Some("logs/b"), &["logs/c", "logs/d"]).await;
    mount_page(&server, Some("logs/d"), &["logs/e"]).await;

    let client = client_for(&server);
    let mut visitor = Collect::default();
    let pages = client.list("logs/", 2, &mut visitor).await.unwrap();

    assert_eq!(pages, 3);
    assert_eq!(
        visitor.pages,
        vec![
            vec!["logs/a", "logs/b"],
            vec!["logs/c", "logs/d"],
            vec!["logs/e"],
        ]
    );

    // Every request is signed
    for request in server.received_requests().await.unwrap() {
        let authorization = request.headers.get("authorization").unwrap().to_str().unwrap();
        assert!(authorization.starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/"));
        assert!(authorization.contains("/us-east-1/s3/aws4_request"));
        assert!(request.headers.contains_key("x-amz-date"));
        assert!(!request.headers.contains_key("content-md5"));
    }
}

#[tokio::test]
async fn test_list_full_page_then_empty_page() {
    let server = MockServer::start().await;
    mount_page(&server, None, &["logs/a", "logs/b"]).await;
    mount_page(&server, Some("logs/b"), &[]).await;

    let client = client_for(&server);
    let mut visitor = Collect::default();
    let pages = client.list("logs/", 2, &mut visitor).await.unwrap();

    assert_eq!(pages, 2);
    assert_eq!(visitor.pages[1], Vec::<String>::new());
}

#[tokio::test]
async fn test_list_stops_when_visitor_declines() {
    let server = MockServer::start().await;
    mount_page(&server, None, &["logs/a", "logs/b"]).await;

    let client = client_for(&server);
    let mut visitor = Collect {
        stop_after: Some(1),
        ..Default::default()
    };
    let pages = client.list("logs/", 2, &mut visitor).await.unwrap();

    assert_eq!(pages, 1);
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_list_aborts_on_error_status() {
    let server = MockServer::start().await;
    mount_page(&server, None, &["logs/a", "logs/b"]).await;
    Mock::given(method("GET"))
        .and(path(BUCKET_PATH))
        .and(query_param("start-after", "logs/b"))
        .respond_with(ResponseTemplate::new(403).set_body_string("<Error>AccessDenied</Error>"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let mut visitor = Collect::default();
    let err = client.list("logs/", 2, &mut visitor).await.unwrap_err();

    assert_eq!(err.status().map(|s| s.as_u16()), Some(403));
    assert_eq!(visitor.pages.len(), 1);
}

#[tokio::test]
async fn test_list_rejects_zero_page_size() {
    let server = MockServer::start().await;
    let client = client_for(&server);
    let err = client
        .list("", 0, &mut Collect::default())
        .await
        .unwrap_err();

    assert!(matches!(err, S3Error::InvalidArgument(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_partial_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{}/", BUCKET_PATH)))
        .and(query_param("delete", ""))
        .and(header_exists("content-md5"))
        .and(body_string(
            "<Delete><Object><Key>A</Key></Object><Object><Key>B</Key></Object>\
             <Object><Key>C</Key></Object></Delete>",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<DeleteResult>\
             <Deleted><Key>A</Key></Deleted>\
             <Error><Key>B</Key><Code>AccessDenied</Code><Message>Access Denied</Message></Error>\
             <Deleted><Key>C</Key></Deleted>\
             </DeleteResult>",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let mut visitor = Record::default();
    client.delete(&["A", "B", "C"], &mut visitor).await.unwrap();

    assert_eq!(visitor.results.len(), 1);
    let result = &visitor.results[0];
    assert_eq!(result.deleted_keys().collect::<Vec<_>>(), vec!["A", "C"]);
    assert_eq!(result.failed_keys().collect::<Vec<_>>(), vec!["B"]);
    assert_eq!(result.failed[0].code, "AccessDenied");
}

#[tokio::test]
async fn test_delete_rejects_empty_batch() {
    let server = MockServer::start().await;
    let client = client_for(&server);
    let keys: [&str; 0] = [];
    let err = client
        .delete(&keys, &mut Record::default())
        .await
        .unwrap_err();
    assert!(matches!(err, S3Error::InvalidArgument(_)));
}

#[tokio::test]
async fn test_download_writes_file_and_creates_parents() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/logs/a.txt", BUCKET_PATH)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"fresh".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let destination = temp_dir.path().join("nested/dir/a.txt");

    let client = client_for(&server);
    let bytes = client.download("logs/a.txt", &destination, false).await.unwrap();

    assert_eq!(bytes, 5);
    assert_eq!(fs::read(&destination).unwrap(), b"fresh");
}

#[tokio::test]
async fn test_download_refuses_existing_file() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    let destination = temp_dir.path().join("a.txt");
    fs::write(&destination, b"old").unwrap();

    let client = client_for(&server);
    let err = client
        .download("logs/a.txt", &destination, false)
        .await
        .unwrap_err();

    assert!(matches!(err, S3Error::DestinationExists(_)));
    assert_eq!(fs::read(&destination).unwrap(), b"old");
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_download_overwrite_replaces_content() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/logs/a.txt", BUCKET_PATH)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"new".to_vec()))
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let destination = temp_dir.path().join("a.txt");
    fs::write(&destination, b"much longer old content").unwrap();

    let client = client_for(&server);
    client.download("logs/a.txt", &destination, true).await.unwrap();

    assert_eq!(fs::read(&destination).unwrap(), b"new");
}

#[tokio::test]
async fn test_download_refuses_directory() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().unwrap();

    let client = client_for(&server);
    let err = client
        .download("logs/a.txt", temp_dir.path(), true)
        .await
        .unwrap_err();

    assert!(matches!(err, S3Error::DestinationIsDirectory(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_download_missing_object() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/missing", BUCKET_PATH)))
        .respond_with(ResponseTemplate::new(404).set_body_string("<Error>NoSuchKey</Error>"))
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let destination = temp_dir.path().join("missing");

    let client = client_for(&server);
    let err = client.download("missing", &destination, false).await.unwrap_err();

    assert_eq!(err.status().map(|s| s.as_u16()), Some(404));
    assert!(!destination.exists());
}

#[tokio::test]
async fn test_upload_sends_content_md5() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path(format!("{}/up/hello.txt", BUCKET_PATH)))
        .and(header("content-md5", "XUFAKrxLKna5cZ2REBfFkg=="))
        .and(header(
            "x-amz-content-sha256",
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824",
        ))
        .and(body_string("hello"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.path().join("hello.txt");
    fs::write(&source, b"hello").unwrap();

    let client = client_for(&server);
    client.upload("up/hello.txt", &source).await.unwrap();
}

#[tokio::test]
async fn test_upload_refuses_directory() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().unwrap();

    let client = client_for(&server);
    let err = client.upload("up/dir", temp_dir.path()).await.unwrap_err();

    assert!(matches!(err, S3Error::SourceIsDirectory(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_upload_rejected_by_server() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(403).set_body_string("denied"))
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.path().join("hello.txt");
    fs::write(&source, b"hello").unwrap();

    let client = client_for(&server);
    let err = client.upload("up/hello.txt", &source).await.unwrap_err();
    assert_eq!(err.to_string(), "http response was: 403 / denied");
}

/// Accepts nothing
struct Decline;

impl DeletionVisitor for Decline {
    fn visit_deletion(&mut self, _result: &DeleteResult) -> bool {
        false
    }
}

#[tokio::test]
async fn test_delete_declined_result_still_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(query_param("delete", ""))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<DeleteResult><Deleted><Key>A</Key></Deleted></DeleteResult>",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    client.delete(&["A"], &mut Decline).await.unwrap();
}

#[tokio::test]
async fn test_slow_response_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/slow.bin", BUCKET_PATH)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"late".to_vec())
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let bucket = Bucket::new(
        "test",
        format!("{}{}", server.uri(), BUCKET_PATH),
        "us-east-1",
        "AKIDEXAMPLE",
        "secret",
    );
    let transport = Transport::new()
        .unwrap()
        .with_timeout(Duration::from_millis(200));
    let client = S3Client::with_transport(bucket, transport);

    let temp_dir = TempDir::new().unwrap();
    let destination = temp_dir.path().join("slow.bin");
    let err = client.download("slow.bin", &destination, false).await.unwrap_err();

    assert!(matches!(err, S3Error::Timeout(d) if d == Duration::from_millis(200)));
    assert!(!destination.exists());
}

#[tokio::test]
async fn test_upload_missing_file_sends_nothing() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().unwrap();

    let client = client_for(&server);
    let err = client
        .upload("up/gone.txt", &temp_dir.path().join("gone.txt"))
        .await
        .unwrap_err();

    assert!(matches!(err, S3Error::Io(ref e) if e.kind() == std::io::ErrorKind::NotFound));
    assert!(server.received_requests().await.unwrap().is_empty());
}
