use tracing::debug;

use crate::error::ClassificationError;
use crate::frame::{Frame, FrameInfo, FrameType};
use crate::header::{Header, HeaderValue};

/// Exposure keywords, tried in order.
const EXPOSURE_KEYWORDS: [&str; 3] = ["TTIME", "XPOSURE", "EXPTIME"];

/// Classify a frame from its header.
///
/// Returns `Ok(None)` for a well-formed frame whose image type matches no
/// known tag; such frames are intentionally left unrouted.
pub fn classify(frame: &Frame) -> Result<Option<FrameInfo>, ClassificationError> {
    classify_header(&frame.header)
}

pub fn classify_header(header: &Header) -> Result<Option<FrameInfo>, ClassificationError> {
    let imtype = match header.get("IMTYPE") {
        Some(HeaderValue::Text(s)) if !s.trim().is_empty() => s.trim().to_ascii_uppercase(),
        Some(other) => {
            return Err(ClassificationError::Unparseable {
                keyword: "IMTYPE",
                value: other.to_string(),
            })
        }
        None => return Err(ClassificationError::MissingKeyword("IMTYPE")),
    };

    let Some(frame_type) = match_type(&imtype) else {
        debug!(imtype = %imtype, "Image type matches no recipe");
        return Ok(None);
    };

    let exposure = exposure_time(header)?;
    let group = group_key(header, frame_type)?;
    let nod_and_shuffle = optional_bool(header, "NASMASK")?.unwrap_or(false);
    let num_open = match header.get("NUMOPEN") {
        None => 0,
        Some(v) => v.as_i64().ok_or_else(|| ClassificationError::Unparseable {
            keyword: "NUMOPEN",
            value: v.to_string(),
        })?,
    };
    let mjd = header.get_f64("MJD");

    Ok(Some(FrameInfo {
        frame_type,
        group,
        exposure,
        nod_and_shuffle,
        num_open,
        mjd,
    }))
}

/// First tag, in priority order, whose keyword occurs in `imtype`.
pub fn match_type(imtype: &str) -> Option<FrameType> {
    FrameType::PRIORITY
        .into_iter()
        .find(|t| imtype.contains(t.keyword()))
}

fn exposure_time(header: &Header) -> Result<f64, ClassificationError> {
    for keyword in EXPOSURE_KEYWORDS {
        if let Some(v) = header.get(keyword) {
            return v
                .as_f64()
                .filter(|t| t.is_finite())
                .ok_or_else(|| ClassificationError::Unparseable {
                    keyword,
                    value: v.to_string(),
                });
        }
    }
    Err(ClassificationError::MissingKeyword("TTIME"))
}

/// `GROUPID` when present, otherwise derived from the instrument state
/// (`STATEID`, then `STATENAM`).
fn group_key(header: &Header, frame_type: FrameType) -> Result<String, ClassificationError> {
    if let Some(group) = header.get_string("GROUPID") {
        let group = group.trim().to_string();
        if !group.is_empty() {
            return Ok(group);
        }
    }
    ["STATEID", "STATENAM"]
        .into_iter()
        .filter_map(|k| header.get_string(k))
        .map(|state| state.trim().to_string())
        .find(|state| !state.is_empty())
        .map(|state| format!("{state}_{frame_type}"))
        .ok_or(ClassificationError::NoGroup)
}

fn optional_bool(header: &Header, keyword: &'static str) -> Result<Option<bool>, ClassificationError> {
    match header.get(keyword) {
        None => Ok(None),
        Some(v) => v
            .as_bool()
            .map(Some)
            .ok_or_else(|| ClassificationError::Unparseable {
                keyword,
                value: v.to_string(),
            }),
    }
}
