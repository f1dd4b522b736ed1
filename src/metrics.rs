use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, Histogram, register_counter, register_counter_vec, register_gauge,
    register_histogram,
};


lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("gateway_requests_total", "Total number of API requests").unwrap();
    pub static ref RATE_LIMITED: CounterVec = register_counter_vec!(
        "gateway_rate_limited_total",
        "Requests rejected by the rate limiter",
        &["class"]
    )
    .unwrap();
    pub static ref AUTH_DENIALS: CounterVec = register_counter_vec!(
        "gateway_auth_denials_total",
        "Requests rejected by the authorization gate",
        &["reason"]
    )
    .unwrap();
    pub static ref RATE_LIMIT_ENTRIES: Gauge = register_gauge!(
        "gateway_rate_limit_entries",
        "Current number of tracked rate limit windows"
    )
    .unwrap();
    pub static ref AI_LATENCY: Histogram = register_histogram!(
        "gateway_ai_latency_seconds",
        "Assistant call latency in seconds"
    )
    .unwrap();
}
