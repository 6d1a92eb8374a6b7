//! A small two-tier rate limiting scheme: a per-connection global command
//! bucket and a process-wide identify bucket, both built from the same
//! [`Bucket`]/[`RateLimiter`] primitives.

mod bucket;
mod identify;
mod limiter;
mod pool;

pub use self::{
    bucket::Bucket,
    identify::IdentifyLimiter,
    limiter::{
        RateLimiter, RouteId, Transaction, GLOBAL_LIMIT, GLOBAL_ROUTE_ID, GLOBAL_WINDOW, IDENTIFY_ROUTE_ID,
        IDENTIFY_WINDOW,
    },
    pool::{BucketPool, PayloadPool},
};
