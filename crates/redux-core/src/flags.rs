use ndarray::{Array2, Zip};

/// Weight a stage adds to every pixel it touches.
///
/// Flags are a sum of weights, not a set of bits: a pixel flagged twice for
/// cosmic rays carries 8, the same value as one that was masked externally.
/// Read them as an accumulated score in recipe order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QualityFlag {
    /// Saturated, or a negative value replaced by the in-slice median.
    Saturated,
    /// Replaced from a known detector defect list.
    Defect,
    /// Cosmic ray hit.
    CosmicRay,
    /// Masked by an external mask before this run.
    PreMasked,
}

impl QualityFlag {
    pub fn weight(self) -> u8 {
        match self {
            Self::Saturated => 1,
            Self::Defect => 2,
            Self::CosmicRay => 4,
            Self::PreMasked => 8,
        }
    }
}

/// Per-pixel accumulated quality flags for one frame.
///
/// The only mutators add weight; nothing here clears a pixel.
#[derive(Clone, Debug, PartialEq)]
pub struct FlagMask(Array2<u8>);

impl FlagMask {
    pub fn zeros(shape: (usize, usize)) -> Self {
        Self(Array2::zeros(shape))
    }

    pub fn dim(&self) -> (usize, usize) {
        self.0.dim()
    }

    pub fn values(&self) -> &Array2<u8> {
        &self.0
    }

    pub fn get(&self, row: usize, col: usize) -> u8 {
        self.0[[row, col]]
    }

    /// Add `flag` at every position where `selected` is true. Returns the
    /// number of pixels touched.
    ///
    /// Saturates at 255 rather than wrapping, so a pixel never drops below
    /// its previous value.
    pub fn accumulate(&mut self, flag: QualityFlag, selected: &Array2<bool>) -> usize {
        self.add_weight(flag.weight(), selected)
    }

    /// Add a raw weight at every selected position. Used by collaborators whose
    /// masks already carry multiples of a weight.
    pub fn add_weight(&mut self, weight: u8, selected: &Array2<bool>) -> usize {
        assert_eq!(
            self.0.dim(),
            selected.dim(),
            "flag mask and selection must have the same shape"
        );
        let mut touched = 0;
        Zip::from(&mut self.0).and(selected).for_each(|f, &sel| {
            if sel {
                *f = f.saturating_add(weight);
                touched += 1;
            }
        });
        touched
    }

    /// Add `flag` to a single pixel.
    pub fn mark(&mut self, flag: QualityFlag, row: usize, col: usize) {
        let f = &mut self.0[[row, col]];
        *f = f.saturating_add(flag.weight());
    }

    /// Number of pixels carrying any weight.
    pub fn flagged_count(&self) -> usize {
        self.0.iter().filter(|&&f| f > 0).count()
    }

    /// True when no pixel in `self` is lower than in `earlier`.
    pub fn dominates(&self, earlier: &FlagMask) -> bool {
        self.0.dim() == earlier.0.dim() && Zip::from(&self.0).and(&earlier.0).all(|a, b| a >= b)
    }

    pub fn into_inner(self) -> Array2<u8> {
        self.0
    }
}

/// Pixels at or above `level`.
pub fn saturated_pixels(data: &Array2<f32>, level: f32) -> Array2<bool> {
    data.mapv(|v| v >= level)
}
