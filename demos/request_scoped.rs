use std::collections::HashMap;
use std::sync::Arc;

use tracing_log_fanout::context::{inject, keys};
use tracing_log_fanout::{
    ContextStore, ErrorInfo, LogContext, LogLevel, Logger, LoggerConfig, RecordDraft,
    RequestContext, TaskLocalContext,
};

#[tokio::main]
async fn main() {
    let logger = Logger::new(LoggerConfig::default(), None).expect("valid config");

    // Server runtime: every request runs in its own task-local unit of work.
    let store = TaskLocalContext::new();
    let mut handles = Vec::new();
    for n in 0..3 {
        let logger = logger.clone();
        handles.push(tokio::spawn(store.run(async move {
            logger.merge_context(LogContext::new().with_request_id(format!("req-{n}")));
            logger.info("handling request");
            store
                .scope_async(LogContext::new().with_action("charge"), async {
                    logger.log(
                        RecordDraft::new(LogLevel::Error, "payment failed")
                            .field("amount_cents", &1299)
                            .error(ErrorInfo::new("StripeError", "rate limited").with_status(429)),
                    );
                })
                .await;
            logger.success("request done");
        })));
    }
    for handle in handles {
        let _ = handle.await;
    }

    // Edge runtime: context arrives in headers and lives for one request.
    let mut headers: HashMap<String, String> = HashMap::new();
    inject(
        &LogContext::new()
            .with_request_id("edge-1")
            .with_user_id("u-42")
            .with_tags(["beta"]),
        &mut headers,
    );
    let request = Arc::new(RequestContext::from_headers(&headers));
    let edge = logger.with_context_store(request.clone());
    request.scope(LogContext::new().with(keys::COMPONENT, "checkout"), || {
        edge.user_action("clicked pay");
    });
    edge.notice("edge request finished");
}
