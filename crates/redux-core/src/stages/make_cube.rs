use std::ops::Range;
use std::sync::Arc;

use ndarray::{s, Array2, Array3, ArrayView2, Axis};
use tracing::{error, info, warn};

use crate::error::{ReduxError, StageError};
use crate::frame::{Cube, Frame, FrameType};
use crate::ledger::{NearestQuery, Record};
use crate::pipeline::StageParams;

use super::{Stage, StageContext, StageOutcome, StageResult};

/// One slice mapped onto the cube grid.
#[derive(Clone, Debug, PartialEq)]
pub struct SliceProduct {
    pub data: Array2<f32>,
    pub flags: Array2<u8>,
}

/// Maps one slice of a raw frame onto the output grid using the geometry
/// solved from an arc frame. The transform itself is supplied from outside.
pub trait SliceWarp: Send + Sync {
    fn warp(
        &self,
        index: usize,
        data: ArrayView2<'_, f32>,
        flags: ArrayView2<'_, u8>,
        out_shape: (usize, usize),
        geometry: &Record,
    ) -> Result<SliceProduct, String>;
}

/// Identity transform: copies each slice onto the grid, zero padded.
#[derive(Clone, Copy, Debug, Default)]
pub struct CopySlice;

impl SliceWarp for CopySlice {
    fn warp(
        &self,
        _index: usize,
        data: ArrayView2<'_, f32>,
        flags: ArrayView2<'_, u8>,
        out_shape: (usize, usize),
        _geometry: &Record,
    ) -> Result<SliceProduct, String> {
        let (h, w) = data.dim();
        let rows = h.min(out_shape.0);
        let cols = w.min(out_shape.1);
        let mut out = Array2::<f32>::zeros(out_shape);
        let mut out_flags = Array2::<u8>::zeros(out_shape);
        out.slice_mut(s![..rows, ..cols])
            .assign(&data.slice(s![..rows, ..cols]));
        out_flags
            .slice_mut(s![..rows, ..cols])
            .assign(&flags.slice(s![..rows, ..cols]));
        Ok(SliceProduct {
            data: out,
            flags: out_flags,
        })
    }
}

/// Split `width` columns into `n` contiguous slices. Leftover columns go to
/// the leading slices.
pub fn partition_columns(width: usize, n: usize) -> Vec<Range<usize>> {
    if n == 0 || width < n {
        return Vec::new();
    }
    let base = width / n;
    let extra = width % n;
    let mut start = 0;
    (0..n)
        .map(|i| {
            let len = base + usize::from(i < extra);
            let range = start..start + len;
            start += len;
            range
        })
        .collect()
}

/// Builds a 3-D cube from a 2-D frame, one slice per worker.
///
/// Needs a geometry solution: the nearest recorded arc frame from the same
/// camera. Without one, or without pixel data, the frame passes through with
/// `GEOMCOR = F` and no cube.
pub struct MakeCube {
    name: String,
    slices: usize,
    warp: Arc<dyn SliceWarp>,
}

impl MakeCube {
    pub fn new(name: impl Into<String>, slices: usize, warp: Arc<dyn SliceWarp>) -> Self {
        Self {
            name: name.into(),
            slices,
            warp,
        }
    }
}

impl Stage for MakeCube {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, mut frame: Frame, _params: &StageParams, ctx: &StageContext<'_>) -> StageResult {
        if frame.data.is_empty() {
            warn!(frame = %frame.name, "No pixel data, cannot make cube");
            frame.header.insert("GEOMCOR", false);
            return Ok(StageOutcome::Completed(frame));
        }

        let near = frame.info.as_ref().and_then(|i| i.mjd);
        let camera = frame.header.get_string("CAMERA");
        let query = NearestQuery::default()
            .near(near)
            .on_camera(camera.as_deref());
        let Some(geometry) = ctx.ledger.nearest_of_type(FrameType::ArcLamp, &query) else {
            error!(frame = %frame.name, "No reference geometry, cannot make cube");
            frame.header.insert("GEOMCOR", false);
            return Ok(StageOutcome::Completed(frame));
        };
        info!(frame = %frame.name, arc = %geometry.frame, "Creating data cube");

        let columns = partition_columns(frame.width(), self.slices);
        if columns.is_empty() {
            return Err(StageError::failed(
                &self.name,
                format!(
                    "cannot cut {} columns into {} slices",
                    frame.width(),
                    self.slices
                ),
            ));
        }
        let out_shape = (
            frame.height(),
            columns.iter().map(|c| c.len()).max().unwrap_or(0),
        );

        let data = &frame.data;
        let flags = frame.flags.values();
        let warp = self.warp.as_ref();
        let fan_in = ctx.runner.run(columns, |i, cols: Range<usize>| {
            warp.warp(
                i,
                data.slice(s![.., cols.clone()]),
                flags.slice(s![.., cols]),
                out_shape,
                &geometry,
            )
        });

        for (i, result) in fan_in.results().iter().enumerate() {
            if let Err(e) = result {
                warn!(frame = %frame.name, slice = i, error = %e, "Slice transform failed");
            }
        }
        let products = match fan_in.into_all() {
            Ok(products) => products,
            Err(ReduxError::UnitFailures { indices }) => {
                return Err(StageError::Units {
                    stage: self.name.clone(),
                    indices,
                })
            }
            Err(e) => return Err(StageError::failed(&self.name, e.to_string())),
        };

        info!(frame = %frame.name, slices = products.len(), "Building cube");
        let (h, w) = out_shape;
        let mut cube_data = Array3::<f32>::zeros((h, w, products.len()));
        let mut cube_flags = Array3::<u8>::zeros((h, w, products.len()));
        for (i, product) in products.into_iter().enumerate() {
            if product.data.dim() != out_shape || product.flags.dim() != out_shape {
                return Err(StageError::failed(
                    &self.name,
                    format!("slice {i} has shape {:?}, expected {out_shape:?}", product.data.dim()),
                ));
            }
            cube_data.index_axis_mut(Axis(2), i).assign(&product.data);
            cube_flags.index_axis_mut(Axis(2), i).assign(&product.flags);
        }

        frame.header.insert("GEOMCOR", true);
        frame.header.insert("GEOMFL", geometry.frame.as_str());
        frame.cube = Some(Cube {
            data: cube_data,
            flags: cube_flags,
            geometry_from: geometry.frame,
        });
        Ok(StageOutcome::Completed(frame))
    }
}
