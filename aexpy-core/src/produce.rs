//! Produce context: timing, log capture and success state around a stage.
//!
//! Every stage runs inside [`produce`]. The context stamps the product with
//! its creation time, duration and producer chain, captures log records
//! emitted on the current thread, and turns a stage error into a `Failure`
//! product instead of propagating it.

use std::cell::RefCell;
use std::fmt::Write as _;
use std::time::Instant;

use chrono::Utc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use crate::error::{Error, Result};
use crate::models::{ProduceState, Product};

/// Prefix of every producer chain written into products.
pub const PRODUCER_PREFIX: &str = concat!("aexpy@", env!("CARGO_PKG_VERSION"));

thread_local! {
    static CAPTURES: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// `tracing` layer that copies formatted events into the innermost active
/// capture buffer of the emitting thread.
///
/// Install it next to the usual `fmt` layer; events outside any capture are
/// ignored by this layer.
#[derive(Debug, Default, Clone, Copy)]
pub struct CaptureLayer;

impl CaptureLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let active = CAPTURES.with(|c| !c.borrow().is_empty());
        if !active {
            return;
        }
        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);
        let meta = event.metadata();
        let line = format!(
            "{} {} {}: {}{}\n",
            Utc::now().format("%H:%M:%S%.3f"),
            meta.level(),
            meta.target(),
            visitor.message,
            visitor.fields
        );
        CAPTURES.with(|c| {
            if let Some(buffer) = c.borrow_mut().last_mut() {
                buffer.push_str(&line);
            }
        });
    }
}

#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

/// Pops its capture buffer on drop so a panicking stage cannot leak it.
struct CaptureGuard {
    depth: usize,
}

impl CaptureGuard {
    fn push() -> Self {
        let depth = CAPTURES.with(|c| {
            let mut c = c.borrow_mut();
            c.push(String::new());
            c.len()
        });
        Self { depth }
    }

    fn finish(self) -> String {
        let text = Self::pop(self.depth);
        std::mem::forget(self);
        text
    }

    fn pop(depth: usize) -> String {
        CAPTURES.with(|c| {
            let mut c = c.borrow_mut();
            if c.len() != depth {
                return String::new();
            }
            let text = c.pop().unwrap_or_default();
            if let Some(parent) = c.last_mut() {
                parent.push_str(&text);
            }
            text
        })
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        Self::pop(self.depth);
    }
}

/// Run `f` while capturing log records emitted on this thread.
///
/// Nested captures see only their own records; on exit the captured text is
/// also appended to the enclosing capture.
pub fn capture_logs<R>(f: impl FnOnce() -> R) -> (R, String) {
    let guard = CaptureGuard::push();
    let result = f();
    (result, guard.finish())
}

/// State of one stage run.
#[derive(Debug)]
pub struct ProduceContext<T> {
    pub product: T,
    /// Log records captured while the stage ran.
    pub log: String,
    /// Rendered stage error, when the product is a `Failure`.
    pub error: Option<String>,
    producers: Vec<String>,
}

impl<T: Product> ProduceContext<T> {
    pub fn new(product: T) -> Self {
        Self {
            product,
            log: String::new(),
            error: None,
            producers: Vec::new(),
        }
    }

    /// Names of the producers used so far. Failed ones carry a `!` suffix.
    pub fn producers(&self) -> &[String] {
        &self.producers
    }

    /// Run a named producer against the product and record it in the chain.
    pub fn using<R>(&mut self, producer: &str, f: impl FnOnce(&mut T) -> Result<R>) -> Result<R> {
        tracing::info!(producer, "Using producer");
        let start = Instant::now();
        let result = f(&mut self.product);
        let elapsed = start.elapsed().as_secs_f64();
        match &result {
            Ok(_) => {
                self.producers.push(producer.to_string());
                tracing::info!(producer, elapsed, "Used producer");
            }
            Err(e) => {
                self.producers.push(format!("{}!", producer));
                tracing::error!(producer, elapsed, error = %e, "Error when using producer");
            }
        }
        result
    }

    /// Like [`using`](Self::using), but a failing producer is logged and skipped.
    pub fn try_using<R>(&mut self, producer: &str, f: impl FnOnce(&mut T) -> Result<R>) -> Option<R> {
        self.using(producer, f).ok()
    }

    /// Combined producer name written into the product.
    pub fn combined_producer(&self) -> String {
        format!("{}[{}]", PRODUCER_PREFIX, self.producers.join(","))
    }

    pub fn is_success(&self) -> bool {
        self.product.info().state == ProduceState::Success
    }

    /// The product when the stage succeeded, otherwise the recorded error.
    pub fn into_result(self) -> Result<T> {
        match self.product.info().state {
            ProduceState::Success => Ok(self.product),
            _ => Err(Error::Other(
                self.error
                    .unwrap_or_else(|| "stage did not complete".to_string()),
            )),
        }
    }
}

/// Run a stage over `product`.
///
/// The product's `creation`, `duration`, `producer` and `state` are always
/// set, whether `stage` succeeds or not.
pub fn produce<T: Product>(
    product: T,
    stage: impl FnOnce(&mut ProduceContext<T>) -> Result<()>,
) -> ProduceContext<T> {
    let mut context = ProduceContext::new(product);
    let creation = Utc::now();
    let start = Instant::now();

    let (outcome, log) = capture_logs(|| {
        tracing::info!("Start producing.");
        let outcome = stage(&mut context);
        match &outcome {
            Ok(()) => tracing::info!("Finish producing."),
            Err(e) => tracing::error!(error = %e, "Failed to produce."),
        }
        outcome
    });

    context.log = log;
    let producer = context.combined_producer();
    let info = context.product.info_mut();
    info.creation = Some(creation);
    info.duration = start.elapsed().as_secs_f64();
    info.producer = producer;
    match outcome {
        Ok(()) => info.state = ProduceState::Success,
        Err(e) => {
            info.state = ProduceState::Failure;
            context.error = Some(e.to_string());
        }
    }
    context
}

/// Reject products that did not finish successfully.
pub fn ensure_success<P: Product>(product: &P, what: &str) -> Result<()> {
    match product.info().state {
        ProduceState::Success => Ok(()),
        state => Err(Error::InvalidInput(format!(
            "{} {} is in state {:?}",
            what,
            product.title(),
            state
        ))),
    }
}
