use std::sync::Arc;

use ndarray::Array2;

use redux_core::frame::Frame;
use redux_core::header::Header;
use redux_core::ledger::{Ledger, MemoryLedger};
use redux_core::pipeline::{Pipeline, ReduxConfig};

/// Header with the keywords every routed frame needs.
pub fn header(imtype: &str, group: &str) -> Header {
    Header::new()
        .with("IMTYPE", imtype)
        .with("TTIME", 30.0)
        .with("GROUPID", group)
        .with("CAMERA", "BLUE")
}

/// Header-only frame for dispatch tests.
pub fn frame(name: &str, imtype: &str, group: &str) -> Frame {
    Frame::header_only(name, header(imtype, group))
}

/// Zero-exposure bias frame.
pub fn bias(name: &str, group: &str) -> Frame {
    Frame::header_only(name, header("BIAS", group).with("TTIME", 0.0))
}

/// Arc frame observed at `mjd`.
pub fn arc(name: &str, group: &str, mjd: f64) -> Frame {
    Frame::header_only(name, header("ARCLAMP", group).with("MJD", mjd))
}

/// Object frame with a column gradient payload.
pub fn object(name: &str, group: &str, shape: (usize, usize)) -> Frame {
    Frame::new(name, gradient(shape), header("OBJECT", group).with("MJD", 60000.5))
}

/// Pixel (r, c) holds `c + 1000 * r`.
pub fn gradient(shape: (usize, usize)) -> Array2<f32> {
    Array2::from_shape_fn(shape, |(r, c)| c as f32 + 1000.0 * r as f32)
}

/// Default config with small, fixed pools.
pub fn config() -> ReduxConfig {
    let mut config = ReduxConfig::default();
    config.parallel.workers = 2;
    config.parallel.frame_workers = 1;
    config
}

pub fn pipeline(config: ReduxConfig) -> (Pipeline, Arc<MemoryLedger>) {
    let ledger = Arc::new(MemoryLedger::new());
    let pipeline = Pipeline::new(config, ledger.clone()).unwrap();
    (pipeline, ledger)
}

/// Stage names recorded for `frame`, in order.
pub fn recorded_stages(ledger: &dyn Ledger, frame: &str) -> Vec<String> {
    ledger
        .records_for(frame)
        .into_iter()
        .map(|r| r.stage)
        .collect()
}
