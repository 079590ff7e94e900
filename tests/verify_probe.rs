use std::path::Path;
use tmdb_harvest::{
    config::Verify,
    record::{MediaKind, RowId},
    verify::{infer_kind, plan_targets, Outcome, Verifier, VerifyTarget},
};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn verify_cfg(base_url: &str) -> Verify {
    Verify {
        base_url: base_url.to_string(),
        timeout_seconds: 2,
        success_delay_ms: 0,
        failure_delay_ms: 0,
        ..Verify::default()
    }
}

async fn mount(server: &MockServer, p: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(p))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

fn target(row: u32, id: i64, votes: i64) -> VerifyTarget {
    VerifyTarget {
        row_id: RowId(row),
        id,
        votes,
    }
}

#[tokio::test]
async fn ok_with_embed_url_is_found() {
    let server = MockServer::start().await;
    mount(&server, "/embed/movie/603/", 200).await;

    let v = Verifier::new(&verify_cfg(&server.uri()), CancellationToken::new()).unwrap();
    let outcome = v.probe(MediaKind::Movie, 603).await.unwrap();

    match outcome {
        Outcome::Found(url) => assert!(url.contains("/embed/movie/603/"), "{url}"),
        other => panic!("expected Found, got {other:?}"),
    }
}

#[tokio::test]
async fn not_found_status_is_not_found() {
    let server = MockServer::start().await;
    mount(&server, "/embed/movie/603/", 404).await;

    let v = Verifier::new(&verify_cfg(&server.uri()), CancellationToken::new()).unwrap();
    assert_eq!(v.probe(MediaKind::Movie, 603).await, Some(Outcome::NotFound));
}

#[tokio::test]
async fn redirect_to_generic_page_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/embed/movie/7/"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/landing"))
        .mount(&server)
        .await;
    mount(&server, "/landing", 200).await;

    let v = Verifier::new(&verify_cfg(&server.uri()), CancellationToken::new()).unwrap();
    assert_eq!(v.probe(MediaKind::Movie, 7).await, Some(Outcome::NotFound));
}

#[tokio::test]
async fn unreachable_service_is_not_found() {
    let port = {
        let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        l.local_addr().unwrap().port()
    };
    let v = Verifier::new(
        &verify_cfg(&format!("http://127.0.0.1:{port}")),
        CancellationToken::new(),
    )
    .unwrap();
    assert_eq!(v.probe(MediaKind::Movie, 1).await, Some(Outcome::NotFound));
}

#[tokio::test]
async fn series_probe_url_has_episode_suffix() {
    let v = Verifier::new(&verify_cfg("https://embed.example/"), CancellationToken::new()).unwrap();
    assert_eq!(
        v.probe_url(MediaKind::Series, 42),
        "https://embed.example/embed/tv/42/1/1"
    );
    assert_eq!(
        v.probe_url(MediaKind::Movie, 42),
        "https://embed.example/embed/movie/42/"
    );
}

#[tokio::test]
async fn every_target_gets_one_outcome() {
    let server = MockServer::start().await;
    mount(&server, "/embed/tv/1/1/1", 200).await;
    mount(&server, "/embed/tv/2/1/1", 404).await;
    mount(&server, "/embed/tv/3/1/1", 500).await;

    let v = Verifier::new(&verify_cfg(&server.uri()), CancellationToken::new()).unwrap();
    let targets = vec![target(2, 1, 10), target(3, 2, 5), target(4, 3, 1)];
    let run = v.verify(MediaKind::Series, &targets).await;

    assert!(!run.interrupted);
    assert_eq!(run.outcomes.len(), 3);
    assert!(run.outcomes[&RowId(2)].is_found());
    assert_eq!(run.outcomes[&RowId(3)], Outcome::NotFound);
    assert_eq!(run.outcomes[&RowId(4)], Outcome::NotFound);
}

#[tokio::test]
async fn cancelled_run_is_marked_interrupted() {
    let token = CancellationToken::new();
    token.cancel();
    let v = Verifier::new(&verify_cfg("http://127.0.0.1:9"), token).unwrap();
    let run = v.verify(MediaKind::Movie, &[target(2, 1, 1)]).await;

    assert!(run.interrupted);
    assert!(run.outcomes.is_empty());
}

#[test]
fn plan_orders_by_votes_and_caps() {
    let targets = vec![target(2, 11, 10), target(3, 12, 50), target(4, 13, 50), target(5, 14, 0)];

    let all = plan_targets(targets.clone(), None);
    let rows: Vec<u32> = all.iter().map(|t| t.row_id.0).collect();
    assert_eq!(rows, vec![3, 4, 2, 5]);

    let capped = plan_targets(targets, Some(2));
    assert_eq!(capped.len(), 2);
    assert_eq!(capped[0].id, 12);
}

#[test]
fn kind_follows_file_name() {
    assert_eq!(infer_kind(Path::new("tmdb-top/tv_by_rating.xlsx")), MediaKind::Series);
    assert_eq!(infer_kind(Path::new("tmdb-top/movies_by_rating.xlsx")), MediaKind::Movie);
    assert_eq!(infer_kind(Path::new("A.xlsx")), MediaKind::Movie);
}
