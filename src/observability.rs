use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("confab.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("confab.client.request_errors");

pub(crate) static STREAM_TOKENS: Counter = Counter::new("confab.stream.tokens");
pub(crate) static STREAM_BYTES: Counter = Counter::new("confab.stream.bytes");
pub(crate) static STREAM_MALFORMED_FRAGMENTS: Counter =
    Counter::new("confab.stream.malformed_fragments");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("confab.stream.errors");
pub(crate) static STREAM_TTFT: Moments = Moments::new("confab.stream.ttft_seconds");
pub(crate) static STREAM_DURATION: Moments = Moments::new("confab.stream.duration_seconds");

pub(crate) static REPLIES_COMPLETED: Counter = Counter::new("confab.reply.completed");
pub(crate) static REPLIES_FAILED: Counter = Counter::new("confab.reply.failed");
pub(crate) static REPLIES_MISSING_CREDENTIAL: Counter =
    Counter::new("confab.reply.missing_credential");

pub(crate) static STORE_WRITES: Counter = Counter::new("confab.store.writes");
pub(crate) static STORE_WRITE_ERRORS: Counter = Counter::new("confab.store.write_errors");
pub(crate) static STORE_IMPORTS: Counter = Counter::new("confab.store.imports");
pub(crate) static STORE_IMPORTS_REJECTED: Counter = Counter::new("confab.store.imports_rejected");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);

    collector.register_counter(&STREAM_TOKENS);
    collector.register_counter(&STREAM_BYTES);
    collector.register_counter(&STREAM_MALFORMED_FRAGMENTS);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_moments(&STREAM_TTFT);
    collector.register_moments(&STREAM_DURATION);

    collector.register_counter(&REPLIES_COMPLETED);
    collector.register_counter(&REPLIES_FAILED);
    collector.register_counter(&REPLIES_MISSING_CREDENTIAL);

    collector.register_counter(&STORE_WRITES);
    collector.register_counter(&STORE_WRITE_ERRORS);
    collector.register_counter(&STORE_IMPORTS);
    collector.register_counter(&STORE_IMPORTS_REJECTED);
}
