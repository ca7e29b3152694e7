//! End-to-end fallback through config-built orchestrators and a mock vendor.

#![cfg(feature = "http")]

use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use quarry_core::{
    AcquisitionRequest, AttemptStatus, Capability, Category, EngineConfig, ErrorCode, FinalState,
    ImageItem, TopicKeyword,
};
use quarry_runtime::{Engine, ProviderRegistry, RequestContext};

const FAST_RETRY: &str = r#"
mode: sequential
attempt_timeout: 2s
retry:
  max_attempts: 3
  initial_delay: 1ms
  max_delay: 5ms
  backoff_multiplier: 2.0
health:
  enabled: false
"#;

fn image_config(server: &MockServer, pexels_env: &str, unsplash_env: &str) -> EngineConfig {
    let yaml = format!(
        r#"{FAST_RETRY}
providers:
  - name: unsplash
    kind: unsplash
    tier: primary
    capability: images
    endpoint: {uri}/unsplash
    credential_env: {unsplash_env}
  - name: pexels
    kind: pexels
    tier: primary
    capability: images
    endpoint: {uri}/pexels
    credential_env: {pexels_env}
  - name: duckduckgo
    kind: duckduckgo
    tier: last_resort
    capability: images
    endpoint: {uri}/ddg
"#,
        uri = server.uri(),
    );
    EngineConfig::from_yaml(&yaml).unwrap()
}

async fn mount_duckduckgo(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/ddg/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"<html>vqd="4-42"</html>"#))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ddg/i.js"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                { "image": "https://img.example.com/1.jpg", "title": "one" },
                { "image": "https://img.example.com/2.jpg", "title": "two" }
            ]
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_images_fall_through_to_last_resort() {
    std::env::set_var("QUARRY_E2E_PEXELS_KEY", "pexels-key");
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/unsplash/search/photos"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/pexels/search"))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&server)
        .await;
    mount_duckduckgo(&server).await;

    let config = image_config(&server, "QUARRY_E2E_PEXELS_KEY", "QUARRY_E2E_UNSET_UNSPLASH_KEY");
    let orchestrator = ProviderRegistry::<ImageItem>::images()
        .build_orchestrator(&config, Capability::Images, None)
        .unwrap();

    let result = orchestrator
        .acquire(&AcquisitionRequest::new("cats"), &RequestContext::new())
        .await
        .unwrap();

    let trail: Vec<(&str, AttemptStatus, Option<ErrorCode>)> = result
        .attempts
        .iter()
        .map(|r| (r.source.as_str(), r.status, r.code))
        .collect();
    assert_eq!(
        trail,
        vec![
            ("unsplash", AttemptStatus::Unavailable, Some(ErrorCode::InvalidConfig)),
            ("pexels", AttemptStatus::Error, Some(ErrorCode::RateLimit)),
            ("duckduckgo", AttemptStatus::Success, None),
        ]
    );
    assert_eq!(result.attempts[1].details, Some(json!({ "tries": 3 })));
    assert_eq!(result.chosen.as_ref().map(|c| c.as_str()), Some("duckduckgo"));
    assert_eq!(result.items.len(), 2);
    assert_eq!(result.state, FinalState::Resolved);
}

#[tokio::test]
async fn test_pinned_source_skips_everything_else() {
    std::env::set_var("QUARRY_E2E_PINNED_PEXELS_KEY", "pexels-key");
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/pexels/search"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    mount_duckduckgo(&server).await;

    let config = image_config(&server, "QUARRY_E2E_PINNED_PEXELS_KEY", "QUARRY_E2E_UNSET_UNSPLASH_KEY");
    let orchestrator = ProviderRegistry::<ImageItem>::images()
        .build_orchestrator(&config, Capability::Images, None)
        .unwrap();

    let result = orchestrator
        .acquire(
            &AcquisitionRequest::new("cats").pinned_to("duckduckgo"),
            &RequestContext::new(),
        )
        .await
        .unwrap();
    assert_eq!(result.attempts.len(), 1);
    assert_eq!(result.chosen.as_ref().map(|c| c.as_str()), Some("duckduckgo"));
}

#[tokio::test]
async fn test_keywords_fall_back_to_library_when_feed_is_down() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/vogue/rss"))
        .respond_with(ResponseTemplate::new(502))
        .expect(3)
        .mount(&server)
        .await;

    let yaml = format!(
        r#"{FAST_RETRY}
providers:
  - name: vogue
    kind: trend_feed
    tier: primary
    capability: keywords
    category: fashion
    endpoint: {uri}/vogue/rss
  - name: bon-appetit
    kind: trend_feed
    tier: primary
    capability: keywords
    category: food
    endpoint: {uri}/food/rss
  - name: keyword-library
    kind: keyword_library
    tier: last_resort
    capability: keywords
"#,
        uri = server.uri(),
    );
    let engine = Engine::from_config(EngineConfig::from_yaml(&yaml).unwrap()).unwrap();

    let request = AcquisitionRequest::new("").with_category(Category::Fashion).with_limit(5);
    let result = engine.keywords(&request, &RequestContext::new()).await.unwrap();

    // the food feed is never consulted for fashion
    let sources: Vec<&str> = result.attempts.iter().map(|r| r.source.as_str()).collect();
    assert_eq!(sources, vec!["vogue", "keyword-library"]);
    assert_eq!(result.attempts[0].code, Some(ErrorCode::UpstreamError));
    assert_eq!(result.items.len(), 5);
    assert!(result
        .items
        .iter()
        .all(|k: &TopicKeyword| k.fallback && k.category == Some(Category::Fashion)));
}

#[tokio::test]
async fn test_factual_subject_is_corroborated_by_two_pages() {
    let server = MockServer::start().await;
    let page = r#"<html><head><title>Top 3 cafes 2024</title></head>
        <body><p>The top 3 cafes in 2024 are Alpha, Beta and Gamma.</p></body></html>"#;
    for route in ["/news", "/search"] {
        Mock::given(method("GET"))
            .and(path(route))
            .and(query_param("q", "top 3 cafes 2024"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page))
            .expect(1)
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/html"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page))
        .expect(0)
        .mount(&server)
        .await;

    let yaml = format!(
        r#"{FAST_RETRY}
providers:
  - name: news
    kind: page_snippet
    tier: primary
    capability: snippets
    endpoint: {uri}/news
  - name: search
    kind: page_snippet
    tier: backup
    capability: snippets
    endpoint: {uri}/search
  - name: html
    kind: page_snippet
    tier: last_resort
    capability: snippets
    endpoint: {uri}/html
"#,
        uri = server.uri(),
    );
    let engine = Engine::from_config(EngineConfig::from_yaml(&yaml).unwrap()).unwrap();

    let corroborated = engine
        .corroborate(&AcquisitionRequest::new("top 3 cafes 2024"), &RequestContext::new())
        .await
        .unwrap();

    assert!(corroborated.verdict.is_factual);
    assert!(corroborated.verdict.valid);
    assert_eq!(corroborated.verdict.required_sources, 2);
    assert_eq!(corroborated.result.chosen.as_ref().map(|c| c.as_str()), Some("news"));
    assert_eq!(corroborated.result.attempts.len(), 2);
}

#[tokio::test]
async fn test_everything_down_is_a_degraded_result_not_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let config = image_config(&server, "QUARRY_E2E_UNSET_PEXELS_KEY", "QUARRY_E2E_UNSET_UNSPLASH_KEY");
    let engine = Engine::from_config(config).unwrap();

    let result = engine
        .images(&AcquisitionRequest::new("cats"), &RequestContext::new())
        .await
        .unwrap();
    assert!(result.is_degraded());
    assert_eq!(result.state, FinalState::Exhausted);
    assert_eq!(result.attempts.len(), 3);
    assert_eq!(result.attempts[2].code, Some(ErrorCode::UpstreamError));
}
