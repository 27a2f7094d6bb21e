pub mod config;
pub mod ctx;
pub mod emit;
pub mod ops;

use ctx::LogCtx;

fn ctx<O: ctx::OpMarker>() -> LogCtx<O> { LogCtx { json: config::logs_are_json(), _marker: std::marker::PhantomData } }

pub fn init() -> LogCtx<ops::init::Init> { ctx() }
pub fn source() -> LogCtx<ops::source::Source> { ctx() }
pub fn ingest() -> LogCtx<ops::ingest::Ingest> { ctx() }
pub fn extract() -> LogCtx<ops::extract::Extract> { ctx() }
pub fn cluster() -> LogCtx<ops::cluster::Cluster> { ctx() }
pub fn summaries() -> LogCtx<ops::summaries::Summaries> { ctx() }
pub fn brief() -> LogCtx<ops::brief::Brief> { ctx() }
