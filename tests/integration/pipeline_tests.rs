//! End-to-end harvest tests
//!
//! These tests use wiremock to serve the pages and media of a fake site and
//! run a full session: page matching, remote link retrieval, dispatching and
//! downloading into a temporary directory.

use linkhound::config::{parse_config, Config};
use linkhound::crawler::{
    build_http_client, fetch_page, Collaborators, HttpFetcher, Session, SessionOptions,
};
use linkhound::dictionary::{load_dictionary, Dictionary};
use linkhound::download::{DownloadSettings, DownloadState, HttpDownloadBackend};
use linkhound::extract::DefaultExtractor;
use linkhound::output::MemoryView;
use linkhound::{LinkStatus, ProcessorStatus};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DICTIONARY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<dictionary version="3" spec="2.0" id="test-site">
    <host id="viewer">
        <domain>127.0.0.1</domain>
        <path-pattern>view/\d+</path-pattern>
        <link-search-pattern>id: photo</link-search-pattern>
    </host>
    <host id="thumbnails">
        <domain>127.0.0.1</domain>
        <path-pattern>thumbs/\w+\.jpg</path-pattern>
        <link-search-pattern>replace:'thumbs','media'</link-search-pattern>
    </host>
    <host id="broken">
        <domain>127.0.0.1</domain>
        <path-pattern>/absolute</path-pattern>
        <link-search-pattern>self</link-search-pattern>
    </host>
</dictionary>"#;

fn create_test_config(output_directory: &Path, max_parallel: i64, hide: bool) -> Config {
    parse_config(&format!(
        r#"
[dictionary]
path = "dictionary.xml"

[user-agent]
crawler-name = "TestBot"
crawler-version = "1.0.0"
contact-url = "https://example.com/contact"
contact-email = "test@example.com"

[downloads]
output-directory = "{}"
max-parallel-downloads = {}
hide-successful-downloads = {}
min-file-size = 10
accepted-mime-types = ["image/"]
"#,
        output_directory.display(),
        max_parallel,
        hide
    ))
    .expect("valid test config")
}

/// Mounts a gallery page, three viewer pages and the media they point to
async fn mount_site(server: &MockServer) {
    let page = |body: &str| {
        ResponseTemplate::new(200)
            .set_body_string(body.to_string())
            .insert_header("content-type", "text/html")
    };

    Mock::given(method("GET"))
        .and(path("/gallery"))
        .respond_with(page(
            "<html><head><title>Gallery</title></head><body>\n\
             <a href=\"/view/1\">one</a>\n\
             <a href=\"/view/2\">two</a>\n\
             <a href=\"/view/3\">three</a>\n\
             <img src=\"/thumbs/a.jpg\">\n\
             </body></html>",
        ))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/view/1"))
        .respond_with(page(r#"<img id="photo" src="/media/1.jpg">"#))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/view/2"))
        .respond_with(page(r#"<img id="photo" src="/media/2.jpg">"#))
        .mount(server)
        .await;
    // /view/3 is not mounted and answers 404

    Mock::given(method("GET"))
        .and(path("/media/1.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![7u8; 64], "image/jpeg"))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/media/2.jpg"))
        .respond_with(page("<html>not an image</html>"))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/media/a.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![1u8, 2, 3], "image/jpeg"))
        .mount(server)
        .await;
}

fn write_dictionary(dir: &Path) -> Dictionary {
    let path = dir.join("dictionary.xml");
    std::fs::write(&path, DICTIONARY).unwrap();
    load_dictionary(&path).unwrap()
}

struct Harvest {
    session: Session,
    backend: HttpDownloadBackend,
    view: Arc<MemoryView>,
    fetcher: Arc<HttpFetcher>,
    _preferences: watch::Sender<linkhound::Preferences>,
}

fn create_harvest(config: &Config, dictionary: Dictionary) -> Harvest {
    let client = build_http_client(&config.user_agent).unwrap();
    let fetcher = Arc::new(HttpFetcher::new(client.clone()));
    let (backend, deltas) =
        HttpDownloadBackend::new(client, DownloadSettings::from(&config.downloads));
    let (preferences_tx, preferences_rx) = watch::channel(config.preferences());
    let view = Arc::new(MemoryView::new());

    let session = Session::new(
        Arc::new(dictionary),
        Collaborators {
            fetcher: fetcher.clone(),
            extractor: Arc::new(DefaultExtractor),
            backend: Arc::new(backend.clone()),
            deltas,
            view: view.clone(),
            preferences: preferences_rx,
        },
        SessionOptions {
            conflict_action: config.downloads.conflict_action,
            save_as: config.downloads.save_as,
            already_visited_cache: config.session.already_visited_cache,
        },
    );

    Harvest {
        session,
        backend,
        view,
        fetcher,
        _preferences: preferences_tx,
    }
}

#[tokio::test]
async fn test_full_harvest() {
    let server = MockServer::start().await;
    mount_site(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("downloads");
    let config = create_test_config(&output, 1, false);
    let dictionary = write_dictionary(dir.path());

    // The rule with an absolute path pattern is reported and skipped
    assert_eq!(dictionary.rules.len(), 3);
    assert_eq!(dictionary.valid_rules().count(), 2);
    assert!(dictionary.errors.iter().all(|e| e.host() == Some("broken")));

    let mut harvest = create_harvest(&config, dictionary);
    let page = fetch_page(harvest.fetcher.as_ref(), &format!("{}/gallery", server.uri()))
        .await
        .unwrap();
    assert_eq!(page.title.as_deref(), Some("Gallery"));

    let ids = harvest.session.add_page(&page);
    assert_eq!(ids.len(), 4);

    harvest.session.run().await;
    assert!(harvest.session.is_idle());

    let processor = |n: usize| harvest.session.processor(ids[n]).unwrap();

    assert_eq!(processor(0).rule_id, "viewer");
    assert_eq!(processor(0).status, ProcessorStatus::GotLinks);
    assert_eq!(
        processor(0).download_links[0].link,
        format!("{}/media/1.jpg", server.uri())
    );
    assert_eq!(processor(0).download_links[0].status, LinkStatus::Success);

    assert_eq!(processor(1).download_links[0].status, LinkStatus::InvalidMimeType);
    assert_eq!(processor(2).status, ProcessorStatus::RetrievingLinksFailure);
    assert!(processor(2).download_links.is_empty());

    assert_eq!(processor(3).rule_id, "thumbnails");
    assert_eq!(
        processor(3).download_links[0].status,
        LinkStatus::UnexpectedSmallSize
    );

    // Only the verified download is kept on disk
    assert_eq!(std::fs::read(output.join("1.jpg")).unwrap().len(), 64);
    assert!(!output.join("2.jpg").exists());
    assert!(!output.join("a.jpg").exists());

    let records = harvest.backend.records();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].1.state, DownloadState::Complete);

    let stats = harvest.session.statistics();
    assert_eq!(stats.total_processors, 4);
    assert_eq!(stats.total_links, 3);
    assert_eq!(stats.links_with(LinkStatus::Success), 1);
    assert_eq!(stats.failed_links(), 2);

    // Every processor was first shown waiting
    for id in &ids {
        let first = harvest
            .view
            .snapshots()
            .into_iter()
            .find(|s| s.id == *id)
            .unwrap();
        assert_eq!(first.status, ProcessorStatus::Waiting);
    }
}

#[tokio::test]
async fn test_same_page_twice_downloads_once() {
    let server = MockServer::start().await;
    mount_site(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("downloads");
    let config = create_test_config(&output, 0, true);
    let mut harvest = create_harvest(&config, write_dictionary(dir.path()));

    let url = format!("{}/gallery", server.uri());
    let page = fetch_page(harvest.fetcher.as_ref(), &url).await.unwrap();
    harvest.session.add_page(&page);
    harvest.session.run().await;

    let ids = harvest.session.add_page(&page);
    harvest.session.run().await;

    let repeated = harvest.session.processor(ids[0]).unwrap();
    assert_eq!(
        repeated.download_links[0].status,
        LinkStatus::AlreadyDownloaded
    );
    assert!(output.join("1.jpg").exists());
    assert!(!output.join("1 (1).jpg").exists());
}

#[tokio::test]
async fn test_existing_file_is_uniquified() {
    let server = MockServer::start().await;
    mount_site(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("downloads");
    std::fs::create_dir_all(&output).unwrap();
    std::fs::write(output.join("1.jpg"), b"previous").unwrap();

    let config = create_test_config(&output, 2, false);
    let mut harvest = create_harvest(&config, write_dictionary(dir.path()));

    let page = fetch_page(harvest.fetcher.as_ref(), &format!("{}/gallery", server.uri()))
        .await
        .unwrap();
    let ids = harvest.session.add_page(&page);
    harvest.session.run().await;

    assert_eq!(
        harvest.session.processor(ids[0]).unwrap().download_links[0].status,
        LinkStatus::Success
    );
    assert_eq!(std::fs::read(output.join("1.jpg")).unwrap(), b"previous");
    assert_eq!(std::fs::read(output.join("1 (1).jpg")).unwrap().len(), 64);
}

#[tokio::test]
async fn test_unreachable_start_page() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&dir.path().join("downloads"), 1, false);
    let harvest = create_harvest(&config, write_dictionary(dir.path()));

    let result = fetch_page(harvest.fetcher.as_ref(), &format!("{}/missing", server.uri())).await;
    assert!(matches!(
        result,
        Err(linkhound::LinkhoundError::PageFetch { status: 404, .. })
    ));
}
