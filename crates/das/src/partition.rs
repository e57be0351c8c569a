//! Splitting a block's sample matrix into retrievable parcels.
//!
//! A block is an `N x N` matrix of samples addressed by flat index
//! `row * N + col`. It is cut two ways: row parcels hold consecutive samples
//! of one row, column parcels hold samples of one column spaced by stride
//! `N`. Each view on its own covers every flat index exactly once.

use das_storage::keys;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{DASError, Result};

/// Identity of a parcel within a block
pub type ParcelId = (usize, bool);

/// A contiguous group of samples in the row or column view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Parcel {
    pub starting_index: usize,
    pub is_row: bool,
    pub sample_count: usize,
}

impl Parcel {
    pub fn id(&self) -> ParcelId {
        (self.starting_index, self.is_row)
    }

    /// Flat indices covered by this parcel
    pub fn sample_indices(&self, row_count: usize) -> impl Iterator<Item = usize> {
        let stride = if self.is_row { 1 } else { row_count };
        let start = self.starting_index;
        (0..self.sample_count).map(move |i| start + i * stride)
    }

    pub fn last_index(&self, row_count: usize) -> usize {
        let stride = if self.is_row { 1 } else { row_count };
        self.starting_index + self.sample_count.saturating_sub(1) * stride
    }

    /// Store key of this parcel for `block_id`
    pub fn key(&self, block_id: u64) -> String {
        keys::sample_key(block_id, self.is_row, self.starting_index)
    }

    pub fn payload_len(&self, sample_size: usize) -> usize {
        self.sample_count * sample_size
    }
}

/// Filter over the combined parcel set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    All,
    Row,
    Col,
}

impl FromStr for View {
    type Err = DASError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "all" => Ok(View::All),
            "row" => Ok(View::Row),
            "col" => Ok(View::Col),
            _ => Err(DASError::InvalidView(s.to_string())),
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            View::All => "all",
            View::Row => "row",
            View::Col => "col",
        };
        f.write_str(name)
    }
}

/// Both parcel views of one block geometry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    row_count: usize,
    parcel_size: usize,
    rows: Vec<Parcel>,
    cols: Vec<Parcel>,
}

/// Split an `N x N` matrix into row and column parcels of `parcel_size` samples.
///
/// When `parcel_size` does not divide `row_count` the last parcel of each
/// row (column) is shorter, so both views still tile the matrix exactly once.
pub fn split_samples_into_parcels(row_count: usize, parcel_size: usize) -> Result<Partition> {
    if row_count == 0 {
        return Err(DASError::InvalidConfig("row_count must be greater than 0".to_string()));
    }
    if parcel_size == 0 {
        return Err(DASError::InvalidConfig("parcel_size must be greater than 0".to_string()));
    }

    let per_line = row_count.div_ceil(parcel_size);
    let mut rows = Vec::with_capacity(row_count * per_line);
    let mut cols = Vec::with_capacity(row_count * per_line);

    for row in 0..row_count {
        for col in (0..row_count).step_by(parcel_size) {
            rows.push(Parcel {
                starting_index: row * row_count + col,
                is_row: true,
                sample_count: parcel_size.min(row_count - col),
            });
        }
    }

    for col in 0..row_count {
        for row in (0..row_count).step_by(parcel_size) {
            cols.push(Parcel {
                starting_index: row * row_count + col,
                is_row: false,
                sample_count: parcel_size.min(row_count - row),
            });
        }
    }

    Ok(Partition {
        row_count,
        parcel_size,
        rows,
        cols,
    })
}

impl Partition {
    pub fn new(row_count: usize, parcel_size: usize) -> Result<Self> {
        split_samples_into_parcels(row_count, parcel_size)
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn parcel_size(&self) -> usize {
        self.parcel_size
    }

    pub fn total_samples(&self) -> usize {
        self.row_count * self.row_count
    }

    pub fn rows(&self) -> &[Parcel] {
        &self.rows
    }

    pub fn cols(&self) -> &[Parcel] {
        &self.cols
    }

    /// Parcels of the requested view, row parcels first for [`View::All`]
    pub fn select(&self, view: View) -> Vec<Parcel> {
        match view {
            View::All => self.rows.iter().chain(self.cols.iter()).copied().collect(),
            View::Row => self.rows.clone(),
            View::Col => self.cols.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len() + self.cols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn covered_indices(parcels: &[Parcel], row_count: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = parcels
            .iter()
            .flat_map(|p| p.sample_indices(row_count))
            .collect();
        indices.sort_unstable();
        indices
    }

    #[test]
    fn test_four_by_four_rows() {
        let partition = split_samples_into_parcels(4, 2).unwrap();
        let starts: Vec<usize> = partition.rows().iter().map(|p| p.starting_index).collect();
        assert_eq!(starts, vec![0, 2, 4, 6, 8, 10, 12, 14]);
        assert!(partition.rows().iter().all(|p| p.sample_count == 2 && p.is_row));
        assert_eq!(covered_indices(partition.rows(), 4), (0..16).collect::<Vec<_>>());
    }

    #[test]
    fn test_four_by_four_cols() {
        let partition = split_samples_into_parcels(4, 2).unwrap();
        let starts: Vec<usize> = partition.cols().iter().map(|p| p.starting_index).collect();
        assert_eq!(starts, vec![0, 8, 1, 9, 2, 10, 3, 11]);

        let first = partition.cols()[0];
        assert_eq!(first.sample_indices(4).collect::<Vec<_>>(), vec![0, 4]);
        assert_eq!(first.last_index(4), 4);
        assert_eq!(covered_indices(partition.cols(), 4), (0..16).collect::<Vec<_>>());
    }

    #[test]
    fn test_non_dividing_parcel_size() {
        let partition = split_samples_into_parcels(5, 2).unwrap();
        // 3 parcels per row: 2 + 2 + 1
        assert_eq!(partition.rows().len(), 15);
        assert_eq!(partition.rows()[2].sample_count, 1);
        assert_eq!(partition.rows()[2].starting_index, 4);
        assert_eq!(covered_indices(partition.rows(), 5), (0..25).collect::<Vec<_>>());
        assert_eq!(covered_indices(partition.cols(), 5), (0..25).collect::<Vec<_>>());
    }

    #[test]
    fn test_parcel_larger_than_row() {
        let partition = split_samples_into_parcels(3, 8).unwrap();
        assert_eq!(partition.rows().len(), 3);
        assert!(partition.rows().iter().all(|p| p.sample_count == 3));
        assert_eq!(covered_indices(partition.cols(), 3), (0..9).collect::<Vec<_>>());
    }

    #[test]
    fn test_zero_sizes_rejected() {
        assert!(matches!(
            split_samples_into_parcels(0, 2),
            Err(DASError::InvalidConfig(_))
        ));
        assert!(matches!(
            split_samples_into_parcels(4, 0),
            Err(DASError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_select_views() {
        let partition = Partition::new(4, 2).unwrap();
        assert_eq!(partition.select(View::All).len(), 16);
        assert!(partition.select(View::Row).iter().all(|p| p.is_row));
        assert!(partition.select(View::Col).iter().all(|p| !p.is_row));
        assert_eq!("COL".parse::<View>().unwrap(), View::Col);
        assert!("diagonal".parse::<View>().is_err());
    }

    #[test]
    fn test_parcel_key_and_payload() {
        let parcel = Parcel {
            starting_index: 9,
            is_row: false,
            sample_count: 2,
        };
        assert_eq!(parcel.key(4), "/das/sample/4/col/9");
        assert_eq!(parcel.payload_len(512), 1024);
    }

    proptest! {
        #[test]
        fn prop_views_tile_matrix(row_count in 1usize..48, parcel_size in 1usize..16) {
            let partition = split_samples_into_parcels(row_count, parcel_size).unwrap();
            let expected: Vec<usize> = (0..row_count * row_count).collect();

            prop_assert_eq!(covered_indices(partition.rows(), row_count), expected.clone());
            prop_assert_eq!(covered_indices(partition.cols(), row_count), expected);
        }

        #[test]
        fn prop_dividing_sizes_have_uniform_parcels(lines in 1usize..12, parcel_size in 1usize..8) {
            let row_count = lines * parcel_size;
            let partition = split_samples_into_parcels(row_count, parcel_size).unwrap();

            prop_assert_eq!(partition.rows().len(), row_count * lines);
            prop_assert_eq!(partition.cols().len(), row_count * lines);
            prop_assert!(partition.select(View::All).iter().all(|p| p.sample_count == parcel_size));
        }

        #[test]
        fn prop_parcel_ids_unique_per_view(row_count in 1usize..32, parcel_size in 1usize..8) {
            let partition = split_samples_into_parcels(row_count, parcel_size).unwrap();
            let all = partition.select(View::All);
            let ids: std::collections::HashSet<ParcelId> = all.iter().map(Parcel::id).collect();
            prop_assert_eq!(ids.len(), all.len());
        }
    }
}
