use std::collections::HashSet;
use std::error::Error as StdError;

use indexmap::IndexSet;
use thiserror::Error;

use super::model::SeriesFiles;

// ---------------------------------------------------------------------------
// File-set provider
// ---------------------------------------------------------------------------

/// Anything that can list the files a given series is read from.
///
/// The series is always passed explicitly; implementations must not depend on
/// a "current series" cursor.
pub trait SeriesFileSource {
    type Error: StdError + Send + Sync + 'static;

    /// Files used by `series`, without duplicates, in the provider's order.
    fn series_used_files(&self, series: usize) -> Result<IndexSet<String>, Self::Error>;
}

#[derive(Debug, Error)]
pub enum PartitionError {
    #[error("at least two series are needed to find shared files, found {found}")]
    InsufficientSeries { found: usize },
    #[error("failed to list the files used by series {series}")]
    Source {
        series: usize,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

fn fetch<S: SeriesFileSource + ?Sized>(
    source: &S,
    series: usize,
) -> Result<IndexSet<String>, PartitionError> {
    source
        .series_used_files(series)
        .map_err(|e| PartitionError::Source {
            series,
            source: Box::new(e),
        })
}

// ---------------------------------------------------------------------------
// Common / series-specific files
// ---------------------------------------------------------------------------

/// Files shared by series 0 and series 1.
///
/// Only the first two series take part in the intersection, even when more
/// exist. Fewer than two series is an [`PartitionError::InsufficientSeries`].
pub fn common_files<S: SeriesFileSource + ?Sized>(
    source: &S,
    series_count: usize,
) -> Result<HashSet<String>, PartitionError> {
    if series_count < 2 {
        return Err(PartitionError::InsufficientSeries {
            found: series_count,
        });
    }
    let first = fetch(source, 0)?;
    let second = fetch(source, 1)?;
    Ok(first
        .into_iter()
        .filter(|file| second.contains(file))
        .collect())
}

/// For every series in `0..series_count`, the used files not in `common`.
pub fn partition<S: SeriesFileSource + ?Sized>(
    source: &S,
    series_count: usize,
    common: &HashSet<String>,
) -> Result<Vec<SeriesFiles>, PartitionError> {
    (0..series_count)
        .map(|series| {
            let files = fetch(source, series)?
                .into_iter()
                .filter(|file| !common.contains(file))
                .collect();
            Ok(SeriesFiles { series, files })
        })
        .collect()
}
