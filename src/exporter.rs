//! The export entry point.
use std::sync::Arc;

use crate::channels::split_channels;
use crate::chunk_key_encoding::normalize_path;
use crate::dataset::{DatasetStatus, DatasetWriter};
use crate::dialect::{MetadataDialect, TemplateMapper};
use crate::image::Image;
use crate::metadata::DataType;
use crate::multiscale::{MultiscaleManifest, build_pyramid};
use crate::options::{ExportConfig, ExportOptions};
use crate::storage::Container;
use crate::writer::{ChunkWriter, ProgressObserver};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetOutcome {
    pub path: String,
    pub status: DatasetStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetadataFailure {
    pub path: String,
    pub message: String,
}

/// What an export did, dataset by dataset.
#[derive(Debug, Clone, Default)]
pub struct ExportReport {
    pub datasets: Vec<DatasetOutcome>,
    pub metadata_failures: Vec<MetadataFailure>,
    /// Present if a multiscale manifest was written.
    pub manifest: Option<MultiscaleManifest>,
}

impl ExportReport {
    pub(crate) fn record(&mut self, path: &str, status: DatasetStatus) {
        self.datasets.push(DatasetOutcome {
            path: path.to_string(),
            status,
        });
    }

    pub(crate) fn record_metadata(&mut self, path: &str, result: Result<()>) {
        if let Err(e) = result {
            self.metadata_failures.push(MetadataFailure {
                path: path.to_string(),
                message: e.to_string(),
            });
        }
    }

    /// Outcome of the dataset at `path`.
    pub fn status(&self, path: &str) -> Option<&DatasetStatus> {
        let path = normalize_path(path);
        self.datasets
            .iter()
            .find(|d| d.path == path)
            .map(|d| &d.status)
    }

    /// No dataset or metadata write failed.
    pub fn is_complete(&self) -> bool {
        self.metadata_failures.is_empty()
            && !self
                .datasets
                .iter()
                .any(|d| matches!(d.status, DatasetStatus::Failed(_)))
    }
}

/// Exports images according to one configuration.
#[derive(Debug, Clone)]
pub struct Exporter {
    config: ExportConfig,
}

impl Exporter {
    pub fn new(config: ExportConfig) -> Self {
        Self { config }
    }

    /// Resolve `options` for `image`; fails before any I/O on bad options.
    pub fn from_options(
        options: &ExportOptions,
        image: &Image,
        mapper: Option<Arc<dyn TemplateMapper>>,
    ) -> Result<Self> {
        Ok(Self::new(options.resolve(image, mapper)?))
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Open the configured container, export `image` into it and close it.
    ///
    /// Configuration errors are reported before the container root is touched.
    pub fn export(&self, image: &Image, progress: &dyn ProgressObserver) -> Result<ExportReport> {
        self.validate(image)?;
        let container = Container::open(&self.config.root)?;
        self.export_to(container, image, progress)
    }

    /// Export into an already open container, which is closed afterwards.
    pub fn export_to(
        &self,
        container: Container,
        image: &Image,
        progress: &dyn ProgressObserver,
    ) -> Result<ExportReport> {
        let result = self.run(&container, image, progress);
        container.close();
        result
    }

    /// Container data type of `image`, if the configuration fits it.
    fn validate(&self, image: &Image) -> Result<DataType> {
        let data_type = image.data_type()?;
        if self.config.block_size.len() != image.num_dimensions() {
            return Err(Error::config(format!(
                "block size {:?} does not match {} image dimensions",
                self.config.block_size,
                image.num_dimensions()
            )));
        }
        Ok(data_type)
    }

    fn run(
        &self,
        container: &Container,
        image: &Image,
        progress: &dyn ProgressObserver,
    ) -> Result<ExportReport> {
        let config = &self.config;
        let data_type = self.validate(image)?;
        log::info!(
            "exporting {} ({}) to {}:{} with {} metadata",
            image.title(),
            data_type,
            config.root.display(),
            config.dataset,
            config.dialect.name()
        );

        let writer = DatasetWriter::new(
            container,
            ChunkWriter::new(config.threads, progress),
            data_type,
            config.compression.clone(),
        );
        let mut report = ExportReport::default();
        match &config.dialect {
            MetadataDialect::OmeNgff => build_pyramid(
                &writer,
                image,
                &config.dataset,
                &config.block_size,
                &config.overwrite,
                config.num_scales,
                &mut report,
            )?,
            MetadataDialect::None | MetadataDialect::ImageJ | MetadataDialect::Custom(_) => {
                self.write_single(&writer, image, &mut report)?
            }
            MetadataDialect::N5Viewer | MetadataDialect::Cosem => {
                self.write_channels(&writer, image, &mut report)?
            }
        }
        Ok(report)
    }

    fn write_single(
        &self,
        writer: &DatasetWriter<'_>,
        image: &Image,
        report: &mut ExportReport,
    ) -> Result<()> {
        let config = &self.config;
        let path = normalize_path(&config.dataset);
        let mut metadata = Ok(());
        let status = writer.write(
            &path,
            image.view(),
            &config.block_size,
            &config.overwrite,
            |path| metadata = config.dialect.write_metadata(image, writer.container(), path),
        )?;
        report.record(&path, status);
        report.record_metadata(&path, metadata);
        Ok(())
    }

    fn write_channels(
        &self,
        writer: &DatasetWriter<'_>,
        image: &Image,
        report: &mut ExportReport,
    ) -> Result<()> {
        let config = &self.config;
        let targets = split_channels(
            image,
            &config.dataset,
            &config.block_size,
            &config.overwrite,
            &config.dialect,
        )?;
        for target in targets {
            let mut metadata = Ok(());
            let result = writer.write(
                &target.path,
                target.view,
                &target.block_size,
                &target.policy,
                |path| metadata = config.dialect.write_metadata(image, writer.container(), path),
            );
            match result {
                Ok(status) => report.record(&target.path, status),
                Err(e) => {
                    log::error!("failed writing channel {} to {}: {e}", target.channel, target.path);
                    report.record(&target.path, DatasetStatus::Failed(e.to_string()));
                }
            }
            report.record_metadata(&target.path, metadata);
        }
        Ok(())
    }
}
