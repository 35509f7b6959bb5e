use super::{ConsoleSink, Destination, Route, SyncWrite};
use crate::level::LogLevel;
use crate::queue::{BatchQueue, QueueStats};
use crate::record::LogRecord;
use serde::Serialize;
use std::io;
use std::sync::Arc;
use std::time::Duration;

/// Per-destination counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DestinationStats {
    pub name: &'static str,
    pub min_level: LogLevel,
    pub failures: u64,
}

/// Fans one record out to every route whose minimum level admits it.
///
/// Routes are fixed at construction. A failing destination never stops
/// delivery to the others.
pub struct Dispatcher {
    routes: Vec<Route>,
    echo_failures: bool,
}

impl Dispatcher {
    /// `echo_failures` reports each failed write on the console (or stderr
    /// when no other console route exists); otherwise failures only move
    /// the route's counter.
    pub fn new(routes: Vec<Route>, echo_failures: bool) -> Self {
        Dispatcher {
            routes,
            echo_failures,
        }
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn dispatch(&self, record: Arc<LogRecord>) {
        for (index, route) in self.routes.iter().enumerate() {
            if !route.accepts(record.level) {
                continue;
            }
            let result = match &route.destination {
                Destination::Console(sink) => sink.write(&record),
                #[cfg(feature = "file")]
                Destination::File(sink) => sink.write(&record),
                Destination::Database(queue) => {
                    queue.enqueue(Arc::clone(&record));
                    Ok(())
                }
            };
            if let Err(err) = result {
                self.report_failure(index, &err);
            }
        }
    }

    fn report_failure(&self, index: usize, err: &io::Error) {
        let route = &self.routes[index];
        route.record_failure();
        if !self.echo_failures {
            return;
        }
        let message = format!("{} destination failed: {}", route.destination.name(), err);
        match self.console_except(index) {
            Some(console) => console.echo_failure(&message),
            None => eprintln!("[log-fanout] {}", message),
        }
    }

    fn console_except(&self, skip: usize) -> Option<&ConsoleSink> {
        self.routes
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != skip)
            .find_map(|(_, route)| match &route.destination {
                Destination::Console(sink) => Some(sink),
                _ => None,
            })
    }

    pub fn console(&self) -> Option<&ConsoleSink> {
        self.routes.iter().find_map(|route| match &route.destination {
            Destination::Console(sink) => Some(sink),
            _ => None,
        })
    }

    pub fn queue(&self) -> Option<&BatchQueue> {
        self.routes.iter().find_map(|route| match &route.destination {
            Destination::Database(queue) => Some(queue),
            _ => None,
        })
    }

    pub fn stats(&self) -> Vec<DestinationStats> {
        self.routes
            .iter()
            .map(|route| DestinationStats {
                name: route.destination.name(),
                min_level: route.min_level,
                failures: route.failures(),
            })
            .collect()
    }

    /// Drain the database queue, if any.
    pub async fn shutdown(&self, timeout: Duration) -> Option<QueueStats> {
        match self.queue() {
            Some(queue) => Some(queue.shutdown(timeout).await),
            None => None,
        }
    }
}
