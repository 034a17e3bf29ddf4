use harvest_config::http::{ExecutorOptions, RenderingApi, RequestError, RequestExecutor};
use harvest_config::proxy::{ProxyEndpoint, ProxyPool};
use std::{sync::Arc, time::Duration};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_options() -> ExecutorOptions {
    ExecutorOptions {
        timeout: Duration::from_secs(5),
        connect_timeout: Duration::from_secs(1),
        min_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
        retry_delay: Duration::ZERO,
        backoff_factor: 0.0,
        ..ExecutorOptions::default()
    }
}

fn executor(options: ExecutorOptions) -> RequestExecutor {
    RequestExecutor::new(options, Arc::new(ProxyPool::default()))
}

#[tokio::test]
async fn test_execute_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/item/1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<h1>Product</h1>"))
        .expect(1)
        .mount(&server)
        .await;

    let response = executor(fast_options())
        .execute(&format!("{}/item/1", server.uri()))
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.body, "<h1>Product</h1>");
    assert!(response.is_success());
}

#[tokio::test]
async fn test_blocked_status_exhausts_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403))
        .expect(3)
        .mount(&server)
        .await;

    let result = executor(fast_options())
        .execute(&format!("{}/blocked", server.uri()))
        .await;

    match result {
        Err(RequestError::Exhausted { attempts, .. }) => assert_eq!(attempts, 3),
        other => panic!("expected exhausted error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_captcha_page_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("please solve the captcha"),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("real page"))
        .expect(1)
        .mount(&server)
        .await;

    let response = executor(fast_options())
        .execute(&format!("{}/item", server.uri()))
        .await
        .unwrap();

    assert_eq!(response.body, "real page");
}

#[tokio::test]
async fn test_persistent_server_error_exhausts_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        // 3 attempts, each a first try plus 3 transport retries
        .expect(12)
        .mount(&server)
        .await;

    let result = executor(fast_options())
        .execute(&format!("{}/flaky", server.uri()))
        .await;

    match result {
        Err(RequestError::Exhausted {
            attempts,
            last_error,
            ..
        }) => {
            assert_eq!(attempts, 3);
            assert!(last_error.contains("502"), "{last_error}");
        }
        other => panic!("expected exhausted error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_server_error_recovers_within_transport_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let response = executor(fast_options())
        .execute(&format!("{}/flaky", server.uri()))
        .await
        .unwrap();

    assert_eq!(response.body, "ok");
}

#[tokio::test]
async fn test_rendering_api_request() {
    let server = MockServer::start().await;
    let target = "https://www.mercadolivre.com.br/p/MLB123";
    Mock::given(method("GET"))
        .and(query_param("api_key", "secret"))
        .and(query_param("url", target))
        .and(query_param("render", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_string("rendered"))
        .expect(1)
        .mount(&server)
        .await;

    let options = ExecutorOptions {
        rendering_api: Some(RenderingApi {
            key: "secret".to_string(),
            url: server.uri(),
            timeout: Duration::from_secs(5),
        }),
        ..fast_options()
    };

    let response = executor(options)
        .execute_via_rendering_api(target)
        .await
        .unwrap();
    assert_eq!(response.body, "rendered");
}

#[tokio::test]
async fn test_rendering_api_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let options = ExecutorOptions {
        rendering_api: Some(RenderingApi {
            key: "bad".to_string(),
            url: server.uri(),
            timeout: Duration::from_secs(5),
        }),
        ..fast_options()
    };

    let result = executor(options)
        .execute_via_rendering_api("https://example.com")
        .await;
    assert!(matches!(result, Err(RequestError::Status(401))));
}

#[tokio::test]
async fn test_rendering_api_without_key_falls_back() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/direct"))
        .respond_with(ResponseTemplate::new(200).set_body_string("direct"))
        .expect(1)
        .mount(&server)
        .await;

    let response = executor(fast_options())
        .execute_via_rendering_api(&format!("{}/direct", server.uri()))
        .await
        .unwrap();
    assert_eq!(response.body, "direct");
}

#[tokio::test]
async fn test_dead_proxy_is_marked_failed() {
    let server = MockServer::start().await;
    let dead = ProxyEndpoint::new("http://127.0.0.1:1");
    let pool = Arc::new(ProxyPool::new(vec![dead.clone()]));
    let options = ExecutorOptions {
        transport_retries: 0,
        ..fast_options()
    };
    let executor = RequestExecutor::new(options, pool.clone());

    let result = executor.execute(&format!("{}/item", server.uri())).await;

    assert!(matches!(result, Err(RequestError::Exhausted { .. })));
    assert!(pool.is_failed(&dead));
}

#[tokio::test]
async fn test_failover_to_working_proxy() {
    // wiremock answers absolute-form proxy requests like any other GET
    let proxy_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/item/7"))
        .respond_with(ResponseTemplate::new(200).set_body_string("via proxy"))
        .mount(&proxy_server)
        .await;

    let dead = ProxyEndpoint::new("http://127.0.0.1:1");
    let alive = ProxyEndpoint::new(proxy_server.uri());
    let pool = Arc::new(ProxyPool::new(vec![dead.clone(), alive.clone()]));
    let options = ExecutorOptions {
        transport_retries: 0,
        ..fast_options()
    };
    let executor = RequestExecutor::new(options, pool.clone());

    // selection is random: keep fetching until the dead proxy has been tried
    for _ in 0..64 {
        // unroutable target, only the proxy can answer it
        let response = executor
            .execute("http://shop.invalid/item/7")
            .await
            .unwrap();
        assert_eq!(response.body, "via proxy");
        assert!(!pool.is_failed(&alive));
        if pool.is_failed(&dead) {
            break;
        }
    }

    assert!(pool.is_failed(&dead));
    assert_eq!(pool.failed_count(), 1);
}
