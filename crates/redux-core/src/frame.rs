use std::fmt;
use std::str::FromStr;

use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};

use crate::flags::FlagMask;
use crate::header::Header;

/// A single raw or partially reduced exposure.
///
/// Frames move by value through the recipe: every stage receives the frame
/// and hands it back (possibly mutated), so no two stages ever alias it.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Identity used as the ledger key, normally the raw file name.
    pub name: String,
    /// Pixel data, row-major, shape = (height, width)
    pub data: Array2<f32>,
    /// Accumulated quality flags, same shape as `data`.
    pub flags: FlagMask,
    pub header: Header,
    /// Classification, filled in by the dispatcher once the frame is planned.
    pub info: Option<FrameInfo>,
    /// Output suffix of the most recent completed stage.
    pub last_suffix: Option<String>,
    /// Whether the ledger already held rows for this frame at ingestion.
    pub in_ledger: bool,
    /// Data cube, present once the frame has been through cube building.
    pub cube: Option<Cube>,
}

impl Frame {
    pub fn new(name: impl Into<String>, data: Array2<f32>, header: Header) -> Self {
        let flags = FlagMask::zeros(data.dim());
        Self {
            name: name.into(),
            data,
            flags,
            header,
            info: None,
            last_suffix: None,
            in_ledger: false,
            cube: None,
        }
    }

    /// A frame with no pixel payload, for dispatch-only work.
    pub fn header_only(name: impl Into<String>, header: Header) -> Self {
        Self::new(name, Array2::zeros((0, 0)), header)
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    pub fn frame_type(&self) -> Option<FrameType> {
        self.info.as_ref().map(|i| i.frame_type)
    }

    pub fn group(&self) -> Option<&str> {
        self.info.as_ref().map(|i| i.group.as_str())
    }
}

/// What the classifier learned from a frame's header.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameInfo {
    pub frame_type: FrameType,
    pub group: String,
    /// Total exposure time in seconds.
    pub exposure: f64,
    /// Nod-and-shuffle mask inserted.
    pub nod_and_shuffle: bool,
    /// Number of shutter openings during the exposure.
    pub num_open: i64,
    /// Observation time (MJD), when known.
    pub mjd: Option<f64>,
}

impl FrameInfo {
    /// Dual-shutter acquisition with more than one sub-exposure.
    pub fn is_nod_and_shuffle(&self) -> bool {
        self.nod_and_shuffle && self.num_open > 1
    }
}

/// Purpose of a raw frame.
///
/// Declaration order is the classification priority: when an image-type
/// string matches several tags the earliest one wins.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FrameType {
    Bias,
    Dark,
    ContBars,
    FlatLamp,
    DomeFlat,
    TwiFlat,
    ArcLamp,
    Object,
}

impl FrameType {
    /// All tags in classification priority order.
    pub const PRIORITY: [FrameType; 8] = [
        FrameType::Bias,
        FrameType::Dark,
        FrameType::ContBars,
        FrameType::FlatLamp,
        FrameType::DomeFlat,
        FrameType::TwiFlat,
        FrameType::ArcLamp,
        FrameType::Object,
    ];

    /// The IMTYPE keyword value identifying this tag.
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Bias => "BIAS",
            Self::Dark => "DARK",
            Self::ContBars => "CONTBARS",
            Self::FlatLamp => "FLATLAMP",
            Self::DomeFlat => "DOMEFLAT",
            Self::TwiFlat => "TWIFLAT",
            Self::ArcLamp => "ARCLAMP",
            Self::Object => "OBJECT",
        }
    }

    pub fn is_calibration(self) -> bool {
        !matches!(self, Self::Object)
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

impl FromStr for FrameType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Self::PRIORITY
            .into_iter()
            .find(|t| t.keyword() == upper)
            .ok_or_else(|| format!("unknown frame type {s:?}"))
    }
}

/// Type of a derived (stacked or master) product.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProductType {
    Mbias,
    Mdark,
    Mcbars,
    Sflat,
    Mflat,
    Sdome,
    Mdome,
    Stwif,
    Mtwif,
    Marc,
    Mobj,
    Sky,
}

impl ProductType {
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Mbias => "MBIAS",
            Self::Mdark => "MDARK",
            Self::Mcbars => "MCBARS",
            Self::Sflat => "SFLAT",
            Self::Mflat => "MFLAT",
            Self::Sdome => "SDOME",
            Self::Mdome => "MDOME",
            Self::Stwif => "STWIF",
            Self::Mtwif => "MTWIF",
            Self::Marc => "MARC",
            Self::Mobj => "MOBJ",
            Self::Sky => "SKY",
        }
    }
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Geometry-corrected data cube, shape = (height, width, slices).
#[derive(Clone, Debug)]
pub struct Cube {
    pub data: Array3<f32>,
    pub flags: Array3<u8>,
    /// Ledger identity of the arc frame whose geometry was used.
    pub geometry_from: String,
}

impl Cube {
    pub fn slices(&self) -> usize {
        self.data.dim().2
    }
}
