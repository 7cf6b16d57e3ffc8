//! EAR query pipeline.

use crate::columnar_reader::ResourceReader;
use crate::error::EarError;
use crate::filter::FilterSpec;
use crate::frame::Frame;
use crate::locator::locate;
use crate::metadata_cache::MetadataCache;
use crate::models::{Page, QueryParams};
use crate::sanitize::sanitize_frame_with_columns;

use std::sync::Arc;

/// Resolves EAR queries against the portal's Parquet resources.
pub struct QueryEngine {
    metadata: MetadataCache,
    reader: Arc<dyn ResourceReader>,
    date_column: String,
    reservoir_column: String,
}

impl QueryEngine {
    /// Return a new QueryEngine.
    ///
    /// # Arguments
    ///
    /// * `metadata`: Package metadata cache
    /// * `reader`: Reader of located resources
    /// * `date_column`: Name of the date column of the resources
    /// * `reservoir_column`: Name of the reservoir name column of the resources
    pub fn new(
        metadata: MetadataCache,
        reader: Arc<dyn ResourceReader>,
        date_column: &str,
        reservoir_column: &str,
    ) -> Self {
        Self {
            metadata,
            reader,
            date_column: date_column.to_string(),
            reservoir_column: reservoir_column.to_string(),
        }
    }

    /// Run a query and return the requested page.
    ///
    /// Filters are resolved before anything is fetched, so a request without a usable time filter
    /// fails without contacting the portal. The resources of every requested year are read one
    /// after another and concatenated in ascending year order.
    #[tracing::instrument(level = "DEBUG", skip(self))]
    pub async fn query(&self, params: &QueryParams) -> Result<Page, EarError> {
        let filters = FilterSpec::resolve(params)?;
        let years = filters.time.years();

        let urls = self.locate_resources(&params.package_id, &years).await?;
        tracing::info!(
            "{} candidate resources for {} over {:?}",
            urls.len(),
            params.package_id,
            years
        );
        if urls.is_empty() {
            return Err(EarError::NotFound(format!(
                "no parquet resource found for package {}",
                params.package_id
            )));
        }

        let mut frames = Vec::with_capacity(urls.len());
        for url in &urls {
            frames.push(self.reader.read(url).await?);
        }

        let frame = self.apply_filters(Frame::concat(frames), &filters)?;
        Ok(paginate(&frame, params.page, params.page_size))
    }

    /// URLs of the resources of each year, in year order. Years without a resource are skipped.
    async fn locate_resources(
        &self,
        package_id: &str,
        years: &[i32],
    ) -> Result<Vec<String>, EarError> {
        if years.is_empty() {
            return Ok(vec![]);
        }
        let metadata = self.metadata.resolve(package_id).await?;
        Ok(years
            .iter()
            .filter_map(|year| locate(&metadata, Some(*year)))
            .map(str::to_string)
            .collect())
    }

    fn apply_filters(&self, frame: Frame, filters: &FilterSpec) -> Result<Frame, EarError> {
        let frame = frame
            .normalize_dates(&self.date_column)?
            .filter(|batch| Ok(filters.time_mask(batch, &self.date_column)))?
            .filter(|batch| filters.reservoir_mask(batch, &self.reservoir_column))?;
        Ok(frame)
    }
}

/// Page `page` (one based) of `frame`, `page_size` rows per page.
///
/// Every row carries all columns of `frame`, whichever batches the page covers.
pub fn paginate(frame: &Frame, page: usize, page_size: usize) -> Page {
    let total = frame.num_rows();
    let offset = page.saturating_sub(1).saturating_mul(page_size);
    let columns = frame.columns();
    Page {
        page,
        page_size,
        has_more: total > offset.saturating_add(page_size),
        data: sanitize_frame_with_columns(&frame.slice(offset, page_size), &columns),
    }
}
