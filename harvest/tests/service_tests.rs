use harvest::prelude::*;
use harvest::queue::SharedScraper;
use harvest::service::queue_options;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_settings() -> Settings {
    let mut settings = Settings::default();
    settings.http.delay.min = 0.0;
    settings.http.delay.max = 0.0;
    settings.http.delay.retry = 0.0;
    settings.http.retry.backoff_factor = 0.0;
    settings.http.timeout = 5;
    settings.queue.idle_delay = 0.05;
    settings
}

fn title_extractor(job: &ScrapeJob, page: &HttpResponse) -> Result<Value, ScrapeError> {
    let title = page
        .body
        .split("<h1>")
        .nth(1)
        .and_then(|rest| rest.split("</h1>").next())
        .ok_or_else(|| ScrapeError::Extraction("no title".to_string()))?;
    Ok(json!({
        "title": title,
        "url": job.url,
        "affiliateLink": job.affiliate_link,
    }))
}

fn events(queue: &TaskQueue) -> mpsc::UnboundedReceiver<TaskEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    queue.subscribe(move |event: &TaskEvent| -> anyhow::Result<()> {
        tx.send(event.clone())?;
        Ok(())
    });
    rx
}

async fn next_terminal(rx: &mut mpsc::UnboundedReceiver<TaskEvent>) -> TaskEvent {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("no event in time")
            .expect("event channel closed");
        if matches!(event, TaskEvent::Completed(_) | TaskEvent::Failed(_)) {
            return event;
        }
    }
}

fn service(settings: Settings) -> ScrapeService {
    ScrapeService::from_settings(settings, |executor| -> SharedScraper {
        Arc::new(
            ScraperRegistry::new()
                .register("amazon", FetchingScraper::new(executor.clone(), title_extractor))
                .register(
                    "mercadolivre",
                    FetchingScraper::new(executor, title_extractor),
                ),
        )
    })
    .unwrap()
}

#[tokio::test]
async fn test_end_to_end_scrape_with_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/dp/B000000001"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<h1>Kindle</h1>"))
        .expect(1)
        .mount(&server)
        .await;

    let service = service(fast_settings());
    let queue = service.queue();
    let mut rx = events(queue);
    let url = format!("{}/dp/B000000001", server.uri());

    let first = queue.add_task(&url, "https://amzn.to/x", "amazon", 0, 3).unwrap();
    let event = next_terminal(&mut rx).await;
    assert!(matches!(event, TaskEvent::Completed(_)));

    let second = queue.add_task(&url, "https://amzn.to/x", "amazon", 0, 3).unwrap();
    next_terminal(&mut rx).await;

    let first = queue.get_task(&first).unwrap();
    let second = queue.get_task(&second).unwrap();
    assert_eq!(first.result.as_ref().unwrap()["title"], "Kindle");
    assert_eq!(first.result, second.result);
    assert_eq!(service.cache().stats().hits, 1);

    service.shutdown().await;
}

#[tokio::test]
async fn test_unsupported_platform_fails_task() {
    let mut settings = fast_settings();
    settings.cache.enabled = false;
    let service = service(settings);
    let queue = service.queue();
    let mut rx = events(queue);

    let id = queue
        .add_task("https://shopee.com.br/item", "", "shopee", 0, 0)
        .unwrap();
    let event = next_terminal(&mut rx).await;
    assert!(matches!(event, TaskEvent::Failed(_)));

    let task = queue.get_task(&id).unwrap();
    assert!(task.error_message.unwrap().contains("Unsupported platform"));
    service.shutdown().await;
}

#[tokio::test]
async fn test_blocked_page_fails_scrape() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<p>captcha</p>"))
        .mount(&server)
        .await;

    let service = service(fast_settings());
    let queue = service.queue();
    let mut rx = events(queue);

    let id = queue
        .add_task(&format!("{}/p/1", server.uri()), "", "mercadolivre", 0, 0)
        .unwrap();
    next_terminal(&mut rx).await;

    let task = queue.get_task(&id).unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.error_message.unwrap().contains("attempts failed"));
    assert!(service.cache().is_empty());
    service.shutdown().await;
}

#[test]
fn test_queue_options_from_settings() {
    let mut settings = Settings::default();
    settings.queue.workers = 3;
    settings.queue.idle_delay = 0.5;
    let options = queue_options(&settings.queue);

    assert_eq!(options.workers, 3);
    assert_eq!(options.idle_delay, Duration::from_millis(500));
    assert_eq!(options.task_timeout, Duration::from_secs(300));
    assert!(options.auto_start);
}

#[test]
fn test_service_needs_runtime() {
    let result = ScrapeService::from_settings(Settings::default(), |executor| -> SharedScraper {
        Arc::new(FetchingScraper::new(executor, title_extractor))
    });
    assert!(result.is_err());
}
