//! Round data model: report matrices, event descriptors and results.
//!
//! Matrices are stored reporter-major in a flat buffer, the cell for
//! reporter `i` and event `j` living at `i * num_events + j`.  All of these
//! types serialize with serde; a report matrix is encoded as a list of rows
//! with `null` marking a missing report.

use crate::error::{ConsensusError, Result};
use crate::fixed::Fixed;
use serde::{de, Deserialize, Deserializer, Serialize};

/// Raw reports for one round.  `None` marks a missing report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<Option<Fixed>>>", into = "Vec<Vec<Option<Fixed>>>")]
pub struct ReportMatrix {
    num_reporters: usize,
    num_events: usize,
    cells: Vec<Option<Fixed>>,
}

impl ReportMatrix {
    /// Builds a matrix from a reporter-major cell buffer.
    pub fn new(num_reporters: usize, num_events: usize, cells: Vec<Option<Fixed>>) -> Result<Self> {
        if cells.len() != num_reporters * num_events {
            return Err(ConsensusError::InvalidInput(format!(
                "expected {} cells for {num_reporters}x{num_events} reports, got {}",
                num_reporters * num_events,
                cells.len()
            )));
        }
        Ok(Self {
            num_reporters,
            num_events,
            cells,
        })
    }

    /// Builds a matrix from one row per reporter.
    pub fn from_rows(rows: Vec<Vec<Option<Fixed>>>) -> Result<Self> {
        let num_events = rows.first().map_or(0, Vec::len);
        if let Some(bad) = rows.iter().position(|row| row.len() != num_events) {
            return Err(ConsensusError::InvalidInput(format!(
                "report row {bad} is not {num_events} events long"
            )));
        }
        let num_reporters = rows.len();
        Self::new(num_reporters, num_events, rows.into_iter().flatten().collect())
    }

    /// Number of reporters (rows).
    pub fn num_reporters(&self) -> usize {
        self.num_reporters
    }

    /// Number of events (columns).
    pub fn num_events(&self) -> usize {
        self.num_events
    }

    /// Report of reporter `i` on event `j`.
    pub fn get(&self, i: usize, j: usize) -> Option<Fixed> {
        self.cells[i * self.num_events + j]
    }

    /// Reports of reporter `i`.
    pub fn row(&self, i: usize) -> &[Option<Fixed>] {
        &self.cells[i * self.num_events..(i + 1) * self.num_events]
    }

    /// Returns `true` when at least one report is missing.
    pub fn has_missing(&self) -> bool {
        self.cells.iter().any(Option::is_none)
    }
}

impl TryFrom<Vec<Vec<Option<Fixed>>>> for ReportMatrix {
    type Error = ConsensusError;

    fn try_from(rows: Vec<Vec<Option<Fixed>>>) -> Result<Self> {
        Self::from_rows(rows)
    }
}

impl From<ReportMatrix> for Vec<Vec<Option<Fixed>>> {
    fn from(matrix: ReportMatrix) -> Self {
        if matrix.num_events == 0 {
            return vec![Vec::new(); matrix.num_reporters];
        }
        matrix
            .cells
            .chunks(matrix.num_events)
            .map(<[Option<Fixed>]>::to_vec)
            .collect()
    }
}

/// Dense reporter-major matrix of scaled values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<Fixed>,
}

impl Matrix {
    /// A `rows x cols` matrix of zeros.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![Fixed::ZERO; rows * cols],
        }
    }

    /// Number of rows (reporters).
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns (events).
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Entry at row `i`, column `j`.
    #[inline]
    pub fn get(&self, i: usize, j: usize) -> Fixed {
        self.data[i * self.cols + j]
    }

    /// Overwrites the entry at row `i`, column `j`.
    #[inline]
    pub fn set(&mut self, i: usize, j: usize, value: Fixed) {
        self.data[i * self.cols + j] = value;
    }

    /// Row `i` as a slice.
    pub fn row(&self, i: usize) -> &[Fixed] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Copies column `j` out.
    pub fn column(&self, j: usize) -> Vec<Fixed> {
        (0..self.rows).map(|i| self.get(i, j)).collect()
    }

    /// Returns `true` when every entry is zero.
    pub fn is_zero(&self) -> bool {
        self.data.iter().all(|v| v.is_zero())
    }
}

/// One flag per (reporter, event) cell; `true` when the value was imputed.
///
/// Deserialization rejects a cell buffer that is not a whole number of rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportMask {
    num_events: usize,
    cells: Vec<bool>,
}

impl ReportMask {
    /// A mask with no imputed cells.
    pub fn new(num_reporters: usize, num_events: usize) -> Self {
        Self {
            num_events,
            cells: vec![false; num_reporters * num_events],
        }
    }

    /// Number of events per row.
    pub fn num_events(&self) -> usize {
        self.num_events
    }

    /// Reporter-major imputation flags.
    pub fn cells(&self) -> &[bool] {
        &self.cells
    }

    /// Marks cell `(i, j)` as imputed.
    pub fn mark(&mut self, i: usize, j: usize) {
        self.cells[i * self.num_events + j] = true;
    }

    /// Whether cell `(i, j)` was imputed.
    pub fn is_imputed(&self, i: usize, j: usize) -> bool {
        self.cells[i * self.num_events + j]
    }

    /// Number of imputed cells in reporter `i`'s row.
    pub fn imputed_in_row(&self, i: usize) -> usize {
        self.cells[i * self.num_events..(i + 1) * self.num_events]
            .iter()
            .filter(|&&m| m)
            .count()
    }

    /// Total number of imputed cells.
    pub fn imputed_total(&self) -> usize {
        self.cells.iter().filter(|&&m| m).count()
    }
}

impl<'de> Deserialize<'de> for ReportMask {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Record {
            num_events: usize,
            cells: Vec<bool>,
        }

        let record = Record::deserialize(deserializer)?;
        let ragged = match record.num_events {
            0 => !record.cells.is_empty(),
            n => record.cells.len() % n != 0,
        };
        if ragged {
            return Err(de::Error::custom(format!(
                "{} mask cells do not form rows of {} events",
                record.cells.len(),
                record.num_events
            )));
        }
        Ok(Self {
            num_events: record.num_events,
            cells: record.cells,
        })
    }
}

/// Describes how one event's reports are interpreted.
///
/// Binary and categorical events take values in `[0, 1]` (`0` = no,
/// `1` = yes, `0.5` = ambiguous).  Scaled events take values in
/// `[min, max]` and are normalized to `[0, 1]` internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventBounds {
    /// Whether the event is scaled.
    pub scaled: bool,
    /// Lower bound of the natural range.
    pub min: Fixed,
    /// Upper bound of the natural range.
    pub max: Fixed,
}

impl EventBounds {
    /// A binary or categorical event over `[0, 1]`.
    pub fn binary() -> Self {
        Self {
            scaled: false,
            min: Fixed::ZERO,
            max: Fixed::ONE,
        }
    }

    /// A scaled event over `[min, max]`.
    pub fn scaled(min: Fixed, max: Fixed) -> Result<Self> {
        let bounds = Self {
            scaled: true,
            min,
            max,
        };
        bounds.validate(0)?;
        Ok(bounds)
    }

    fn validate(&self, event: usize) -> Result<()> {
        if self.scaled && self.min >= self.max {
            return Err(ConsensusError::InvalidInput(format!(
                "event {event}: scaled bounds require min < max"
            )));
        }
        Ok(())
    }

    fn accepts(&self, value: Fixed) -> bool {
        if self.scaled {
            value >= self.min && value <= self.max
        } else {
            value >= Fixed::ZERO && value <= Fixed::ONE
        }
    }

    /// Maps a natural-unit value into `[0, 1]`.  Binary values pass through.
    pub fn normalize(&self, value: Fixed) -> Result<Fixed> {
        if !self.scaled {
            return Ok(value);
        }
        value
            .checked_sub(self.min)?
            .checked_div(self.max.checked_sub(self.min)?)
    }

    /// Maps a normalized value back into natural units.
    pub fn denormalize(&self, value: Fixed) -> Result<Fixed> {
        if !self.scaled {
            return Ok(value);
        }
        value
            .checked_mul(self.max.checked_sub(self.min)?)?
            .checked_add(self.min)
    }
}

/// Everything a round consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundInput {
    /// Reports, one row per reporter.
    pub reports: ReportMatrix,
    /// Prior reputation, aligned with report rows.
    pub reputation: Vec<Fixed>,
    /// One descriptor per event column.
    pub events: Vec<EventBounds>,
}

impl RoundInput {
    /// Checks shapes, bounds and reputation before any stage runs.
    pub fn validate(&self) -> Result<()> {
        let (n, m) = (self.reports.num_reporters(), self.reports.num_events());
        if n == 0 || m == 0 {
            return Err(ConsensusError::InvalidInput(
                "a round needs at least one reporter and one event".into(),
            ));
        }
        if self.reputation.len() != n {
            return Err(ConsensusError::InvalidInput(format!(
                "{} reputation entries for {n} reporters",
                self.reputation.len()
            )));
        }
        if self.events.len() != m {
            return Err(ConsensusError::InvalidInput(format!(
                "{} event descriptors for {m} events",
                self.events.len()
            )));
        }
        if let Some(i) = self.reputation.iter().position(|r| r.is_negative()) {
            return Err(ConsensusError::InvalidInput(format!(
                "reporter {i} has negative reputation"
            )));
        }
        let total = crate::fixed::checked_sum(self.reputation.iter().copied())?;
        if total.is_zero() {
            return Err(ConsensusError::InvalidInput(
                "total reputation must be positive".into(),
            ));
        }
        for (j, bounds) in self.events.iter().enumerate() {
            bounds.validate(j)?;
            for i in 0..n {
                if let Some(value) = self.reports.get(i, j) {
                    if !bounds.accepts(value) {
                        return Err(ConsensusError::InvalidInput(format!(
                            "report ({i}, {j}) = {value} lies outside the event range"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Everything a round produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundOutcome {
    /// Final outcome per event, in natural units.
    pub outcomes: Vec<Fixed>,
    /// Normalized reputation-weighted result per event before rounding.
    pub outcomes_raw: Vec<Fixed>,
    /// Share of smoothed reputation agreeing with each outcome.
    pub certainty: Vec<Fixed>,
    /// Updated reputation; sums to the prior total.
    pub reputation: Vec<Fixed>,
    /// Signed participation bonus per reporter.
    pub bonus: Vec<Fixed>,
    /// Imputed-cell mask.
    pub mask: ReportMask,
    /// Converged loading vector.
    pub loading: Vec<Fixed>,
    /// Projection of each reporter onto the loading vector.
    pub scores: Vec<Fixed>,
    /// Scores after direction selection.
    pub adjusted_scores: Vec<Fixed>,
    /// Power iterations spent.
    pub iterations: u32,
    /// Whether the solver met its tolerance before the cap.
    pub converged: bool,
    /// Reputation-weighted share of imputed cells.
    pub na_fraction: Fixed,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(v: i64) -> Option<Fixed> {
        Some(Fixed::from_int(v))
    }

    #[test]
    fn test_from_rows_rejects_ragged_input() {
        let rows = vec![vec![cell(1), cell(0)], vec![cell(1)]];
        assert!(matches!(
            ReportMatrix::from_rows(rows),
            Err(ConsensusError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_report_matrix_json_uses_null_for_missing() {
        let matrix = ReportMatrix::from_rows(vec![vec![cell(1), None], vec![cell(0), cell(1)]])
            .unwrap();
        let json = serde_json::to_string(&matrix).unwrap();
        assert_eq!(json, r#"[["1",null],["0","1"]]"#);
        let back: ReportMatrix = serde_json::from_str(&json).unwrap();
        assert_eq!(back, matrix);
        assert!(back.has_missing());
        assert_eq!(back.get(0, 1), None);
    }

    #[test]
    fn test_scaled_bounds_round_trip() {
        let bounds = EventBounds::scaled(Fixed::from_int(8000), Fixed::from_int(20000)).unwrap();
        let normalized = bounds.normalize(Fixed::from_int(14000)).unwrap();
        assert_eq!(normalized, Fixed::HALF);
        assert_eq!(
            bounds.denormalize(normalized).unwrap(),
            Fixed::from_int(14000)
        );
        assert!(EventBounds::scaled(Fixed::ONE, Fixed::ONE).is_err());
    }

    #[test]
    fn test_validate_checks_shapes_and_reputation() {
        let reports = ReportMatrix::from_rows(vec![vec![cell(1)], vec![cell(0)]]).unwrap();
        let mut input = RoundInput {
            reports,
            reputation: vec![Fixed::ONE, Fixed::ONE],
            events: vec![EventBounds::binary()],
        };
        assert!(input.validate().is_ok());

        input.reputation = vec![Fixed::ONE];
        assert!(input.validate().is_err());

        input.reputation = vec![Fixed::ZERO, Fixed::ZERO];
        assert!(input.validate().is_err());

        input.reputation = vec![Fixed::ONE, Fixed::from_int(-1)];
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_reports() {
        let reports = ReportMatrix::from_rows(vec![vec![cell(2)]]).unwrap();
        let input = RoundInput {
            reports,
            reputation: vec![Fixed::ONE],
            events: vec![EventBounds::binary()],
        };
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_mask_counts() {
        let mut mask = ReportMask::new(2, 3);
        mask.mark(1, 0);
        mask.mark(1, 2);
        assert!(mask.is_imputed(1, 2));
        assert!(!mask.is_imputed(0, 2));
        assert_eq!(mask.imputed_in_row(1), 2);
        assert_eq!(mask.imputed_in_row(0), 0);
        assert_eq!(mask.imputed_total(), 2);
    }

    #[test]
    fn test_mask_json_rejects_ragged_cells() {
        let mut mask = ReportMask::new(2, 3);
        mask.mark(0, 1);
        let text = serde_json::to_string(&mask).unwrap();
        assert_eq!(serde_json::from_str::<ReportMask>(&text).unwrap(), mask);

        let ragged = r#"{"num_events":3,"cells":[false,true,false,true]}"#;
        assert!(serde_json::from_str::<ReportMask>(ragged).is_err());
        let eventless = r#"{"num_events":0,"cells":[true]}"#;
        assert!(serde_json::from_str::<ReportMask>(eventless).is_err());
    }
}
