use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use n5_export::dataset::{DatasetStatus, read_region};
use n5_export::dialect::ngff::read_multiscales;
use n5_export::dialect::{MetadataDialect, TemplateMapper};
use n5_export::exporter::{ExportReport, Exporter};
use n5_export::image::{Calibration, Dimensions, Image, PixelArray, column_major};
use n5_export::metadata::{AxisOrder, DataType, N5Compression};
use n5_export::options::{ExportConfig, ExportOptions, OverwritePolicy};
use n5_export::storage::{Container, ContainerFormat};
use n5_export::writer::NoProgress;
use n5_export::{Error, Result};
use zarrs::storage::store::MemoryStore;
use zarrs::storage::{
    ReadableStorageTraits, ReadableWritableListableStorage, StoreKey, WritableStorageTraits,
};

fn init_logger() {
    env_logger::try_init().ok();
}

fn gray16(dims: Dimensions, base: u16) -> (Image, Vec<u16>) {
    let n: u64 = dims.shape().iter().product();
    let data: Vec<u16> = (0..n).map(|i| base.wrapping_add(i as u16)).collect();
    let pixels = PixelArray::Gray16(column_major(&dims.shape(), data.clone()).expect("shape"));
    (Image::new("test image", dims, pixels).expect("image"), data)
}

fn read_u16(container: &Container, path: &str, origin: &[u64], extent: &[u64]) -> Vec<u16> {
    read_region(container, path, origin, extent).expect("read region")
}

fn config(
    dataset: &str,
    block_size: Vec<u32>,
    dialect: MetadataDialect,
    overwrite: OverwritePolicy,
) -> ExportConfig {
    ExportConfig {
        root: PathBuf::new(),
        dataset: dataset.into(),
        block_size,
        compression: N5Compression::Raw,
        dialect,
        threads: 2,
        overwrite,
        num_scales: 1,
    }
}

struct MemoryContainer {
    store: ReadableWritableListableStorage,
    format: ContainerFormat,
}

impl MemoryContainer {
    fn new(format: ContainerFormat) -> Self {
        init_logger();
        Self {
            store: Arc::new(MemoryStore::new()),
            format,
        }
    }

    fn open(&self) -> Container {
        Container::open_with_store(self.store.clone(), self.format).expect("open container")
    }

    fn export(&self, config: ExportConfig, image: &Image) -> Result<ExportReport> {
        Exporter::new(config).export_to(self.open(), image, &NoProgress)
    }
}

#[test]
fn single_channel_volume_end_to_end() {
    let mem = MemoryContainer::new(ContainerFormat::N5);
    let (image, data) = gray16(Dimensions::new(64, 64, 1, 4, 1), 0);
    let options = ExportOptions {
        dataset: "volume".into(),
        block_size: "32,32,1".into(),
        compression: "raw".into(),
        metadata: MetadataDialect::NONE.into(),
        overwrite: "Overwrite".into(),
        ..Default::default()
    };
    let exporter = Exporter::from_options(&options, &image, None).unwrap();
    let report = exporter
        .export_to(mem.open(), &image, &NoProgress)
        .unwrap();

    assert_eq!(
        report.status("volume"),
        Some(&DatasetStatus::Written { blocks: 16 })
    );
    assert!(report.is_complete());

    let container = mem.open();
    let attrs = container.dataset_attributes("volume").unwrap();
    assert_eq!(attrs.dimensions, vec![64, 64, 4]);
    assert_eq!(attrs.block_size, vec![32, 32, 1]);
    assert_eq!(attrs.data_type, DataType::Uint16);
    assert_eq!(attrs.compression, N5Compression::Raw);
    assert_eq!(
        read_u16(&container, "volume", &[0, 0, 0], &[64, 64, 4]),
        data
    );
}

#[test]
fn refuse_leaves_first_write() {
    let mem = MemoryContainer::new(ContainerFormat::N5);
    let (first, first_data) = gray16(Dimensions::new(10, 6, 1, 1, 1), 0);
    let (second, _) = gray16(Dimensions::new(10, 6, 1, 1, 1), 1000);
    let config = config("d", vec![4, 4], MetadataDialect::None, OverwritePolicy::Refuse);

    mem.export(config.clone(), &first).unwrap();
    let report = mem.export(config, &second).unwrap();
    assert_eq!(report.status("d"), Some(&DatasetStatus::Skipped));

    let container = mem.open();
    assert_eq!(
        read_u16(&container, "d", &[0, 0], &[10, 6]),
        first_data
    );
}

#[test]
fn overwrite_keeps_second_write() {
    let mem = MemoryContainer::new(ContainerFormat::N5);
    let (first, _) = gray16(Dimensions::new(10, 6, 1, 1, 1), 0);
    let (second, second_data) = gray16(Dimensions::new(10, 6, 1, 1, 1), 1000);
    let config = config("d", vec![4, 4], MetadataDialect::None, OverwritePolicy::Overwrite);

    mem.export(config.clone(), &first).unwrap();
    mem.export(config, &second).unwrap();

    let container = mem.open();
    assert_eq!(
        read_u16(&container, "d", &[0, 0], &[10, 6]),
        second_data
    );
}

#[test]
fn subset_merge_into_fresh_dataset() {
    for format in [ContainerFormat::N5, ContainerFormat::Zarr] {
        let mem = MemoryContainer::new(format);
        let (patch, patch_data) = gray16(Dimensions::new(5, 3, 1, 1, 1), 7);
        let policy = OverwritePolicy::MergeSubset {
            offset: vec![6, 2],
        };
        let report = mem
            .export(config("m", vec![4, 4], MetadataDialect::ImageJ, policy), &patch)
            .unwrap();
        assert!(matches!(
            report.status("m"),
            Some(DatasetStatus::Written { .. })
        ));

        let container = mem.open();
        let attrs = container.dataset_attributes("m").unwrap();
        assert_eq!(attrs.dimensions, vec![11, 5]);
        assert_eq!(
            read_u16(&container, "m", &[6, 2], &[5, 3]),
            patch_data
        );
        // nothing left of the box was touched
        assert_eq!(
            read_u16(&container, "m", &[0, 0], &[6, 5]),
            vec![0; 6 * 5]
        );
        // metadata was written for the placeholder
        assert_eq!(container.attributes("m").unwrap()["name"], "test image");
    }
}

#[test]
fn pyramid_scales_space_axes_only() {
    let mem = MemoryContainer::new(ContainerFormat::N5);
    let (image, _) = gray16(Dimensions::new(256, 256, 1, 1, 3), 0);
    let mut config = config(
        "pyramid",
        vec![64, 64, 1],
        MetadataDialect::OmeNgff,
        OverwritePolicy::Overwrite,
    );
    config.num_scales = 3;
    let report = mem.export(config, &image).unwrap();
    assert!(report.is_complete());

    let manifest = report.manifest.expect("manifest written");
    assert_eq!(manifest.axis_order, AxisOrder::ColumnMajor);
    let scales: Vec<Vec<f64>> = manifest.levels.iter().map(|l| l.metadata.scale.clone()).collect();
    assert_eq!(
        scales,
        vec![vec![1.0, 1.0, 1.0], vec![2.0, 2.0, 1.0], vec![4.0, 4.0, 1.0]]
    );
    for level in &manifest.levels {
        assert_eq!(level.factors[2], 1);
    }

    let container = mem.open();
    assert_eq!(
        container.dataset_attributes("pyramid/s2").unwrap().dimensions,
        vec![64, 64, 3]
    );
    let stored = read_multiscales(&container, "pyramid").unwrap().expect("multiscales");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].version, "0.4");
    let paths: Vec<&str> = stored[0].datasets.iter().map(|d| d.path.as_str()).collect();
    assert_eq!(paths, vec!["s0", "s1", "s2"]);
    assert!(container.attributes("pyramid/s1").unwrap().contains_key("coordinateTransformations"));
}

#[test]
fn pyramid_subsamples_from_full_resolution() {
    let mem = MemoryContainer::new(ContainerFormat::N5);
    let (image, data) = gray16(Dimensions::new(8, 4, 1, 1, 1), 0);
    let mut config = config("p", vec![4, 4], MetadataDialect::OmeNgff, OverwritePolicy::Overwrite);
    config.num_scales = 3;
    mem.export(config, &image).unwrap();

    let container = mem.open();
    let s2 = read_u16(&container, "p/s2", &[0, 0], &[2, 1]);
    assert_eq!(s2, vec![data[0], data[4]]);
}

#[test]
fn zarr_pyramid_is_row_major() {
    let mem = MemoryContainer::new(ContainerFormat::Zarr);
    let (image, _) = gray16(Dimensions::new(32, 16, 1, 1, 1), 0);
    let image = image.with_calibration(Calibration {
        pixel_width: 0.5,
        pixel_height: 3.0,
        ..Default::default()
    });
    let mut config = config("", vec![8, 8], MetadataDialect::OmeNgff, OverwritePolicy::Overwrite);
    config.num_scales = 2;
    let report = mem.export(config, &image).unwrap();

    let manifest = report.manifest.expect("manifest written");
    assert_eq!(manifest.axis_order, AxisOrder::RowMajor);
    assert_eq!(manifest.axes[0].name, "y");
    assert_eq!(manifest.levels[0].metadata.scale, vec![3.0, 0.5]);
    assert_eq!(manifest.levels[1].metadata.scale, vec![6.0, 1.0]);

    let container = mem.open();
    let attrs = container.dataset_attributes("s1").unwrap();
    assert_eq!(attrs.dimensions, vec![16, 8]);
    assert_eq!(attrs.axis_order, AxisOrder::RowMajor);
}

#[test]
fn n5_viewer_splits_channels() {
    let mem = MemoryContainer::new(ContainerFormat::N5);
    let (image, data) = gray16(Dimensions::new(8, 8, 2, 1, 1), 0);
    let report = mem
        .export(
            config("multi", vec![4, 4, 1], MetadataDialect::N5Viewer, OverwritePolicy::Overwrite),
            &image,
        )
        .unwrap();
    assert!(report.is_complete());

    let container = mem.open();
    for c in 0..2usize {
        let path = format!("multi/c{c}/s0");
        assert_eq!(
            report.status(&path),
            Some(&DatasetStatus::Written { blocks: 4 })
        );
        let attrs = container.dataset_attributes(&path).unwrap();
        assert_eq!(attrs.block_size, vec![4, 4]);
        assert_eq!(attrs.dimensions, vec![8, 8]);
        assert_eq!(
            read_u16(&container, &path, &[0, 0], &[8, 8]),
            data[c * 64..(c + 1) * 64].to_vec()
        );
        assert!(container.attributes(&path).unwrap().contains_key("pixelResolution"));
    }
}

#[test]
fn cosem_splits_into_channel_datasets() {
    let mem = MemoryContainer::new(ContainerFormat::N5);
    let (image, _) = gray16(Dimensions::new(4, 4, 3, 2, 1), 0);
    let report = mem
        .export(
            config("c", vec![4, 4, 1, 1], MetadataDialect::Cosem, OverwritePolicy::Overwrite),
            &image,
        )
        .unwrap();
    let paths: Vec<&str> = report.datasets.iter().map(|d| d.path.as_str()).collect();
    assert_eq!(paths, vec!["c/c0", "c/c1", "c/c2"]);

    let container = mem.open();
    let transform = &container.attributes("c/c1").unwrap()["transform"];
    assert_eq!(transform["axes"], serde_json::json!(["z", "y", "x"]));
    assert_eq!(
        container.dataset_attributes("c/c1").unwrap().block_size,
        vec![4, 4, 1]
    );
}

#[test]
fn refused_channel_does_not_stop_siblings() {
    let mem = MemoryContainer::new(ContainerFormat::N5);
    let (image, _) = gray16(Dimensions::new(4, 4, 2, 1, 1), 0);
    let (single, _) = gray16(Dimensions::new(4, 4, 1, 1, 1), 0);
    mem.export(
        config("r/c0/s0", vec![4, 4], MetadataDialect::None, OverwritePolicy::Overwrite),
        &single,
    )
    .unwrap();

    let report = mem
        .export(
            config("r", vec![4, 4, 1], MetadataDialect::N5Viewer, OverwritePolicy::Refuse),
            &image,
        )
        .unwrap();
    assert_eq!(report.status("r/c0/s0"), Some(&DatasetStatus::Skipped));
    assert_eq!(
        report.status("r/c1/s0"),
        Some(&DatasetStatus::Written { blocks: 1 })
    );
}

#[test]
fn progress_ends_at_one() {
    init_logger();
    let mem = MemoryContainer::new(ContainerFormat::N5);
    let (image, _) = gray16(Dimensions::new(64, 64, 1, 1, 1), 0);
    let mut config = config("p", vec![8, 8], MetadataDialect::None, OverwritePolicy::Overwrite);
    config.threads = 1;

    let seen = Mutex::new(Vec::new());
    let observer = |f: f64| seen.lock().unwrap().push(f);
    Exporter::new(config)
        .export_to(mem.open(), &image, &observer)
        .unwrap();

    let seen = seen.into_inner().unwrap();
    assert_eq!(seen.last(), Some(&1.0));
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    assert!(seen.iter().all(|&f| f <= 1.0));
}

#[test]
fn indexed_color_is_refused_before_writing() {
    let mem = MemoryContainer::new(ContainerFormat::N5);
    let dims = Dimensions::new(4, 4, 1, 1, 1);
    let pixels = PixelArray::Color256(column_major(&dims.shape(), vec![0u8; 16]).unwrap());
    let image = Image::new("lut", dims, pixels).unwrap();
    let policy = OverwritePolicy::MergeSubset { offset: vec![0, 0] };

    let result = mem.export(config("lut", vec![4, 4], MetadataDialect::None, policy), &image);
    assert!(matches!(result, Err(Error::UnsupportedType(_))));
    assert!(!mem.open().dataset_exists("lut").unwrap());
}

#[test]
fn corrupt_block_fails_the_dataset() {
    let mem = MemoryContainer::new(ContainerFormat::N5);
    let (image, _) = gray16(Dimensions::new(8, 8, 1, 1, 1), 0);
    mem.export(
        config("bad", vec![4, 4], MetadataDialect::None, OverwritePolicy::Overwrite),
        &image,
    )
    .unwrap();
    mem.store
        .set(&StoreKey::new("bad/1/1").unwrap(), Bytes::from_static(&[0, 0, 0]))
        .unwrap();

    // the patch covers block (1, 1) in part, so it must be read back
    let (patch, _) = gray16(Dimensions::new(2, 2, 1, 1, 1), 0);
    let policy = OverwritePolicy::MergeSubset { offset: vec![5, 5] };
    let result = mem.export(config("bad", vec![4, 4], MetadataDialect::None, policy), &patch);
    match result {
        Err(Error::ChunkWrite { grid_position, .. }) => assert_eq!(grid_position, vec![1, 1]),
        other => panic!("expected a block failure, got {other:?}"),
    }
}

#[derive(Debug)]
struct ResolutionOnly;

impl TemplateMapper for ResolutionOnly {
    fn map(&self, imagej: &serde_json::Value) -> Result<serde_json::Value> {
        Ok(serde_json::json!({ "resolution": [imagej["pixelWidth"], imagej["pixelHeight"]] }))
    }
}

#[test]
fn custom_template_is_written() {
    let mem = MemoryContainer::new(ContainerFormat::N5);
    let (image, _) = gray16(Dimensions::new(4, 4, 1, 1, 1), 0);
    let dialect = MetadataDialect::Custom(Arc::new(ResolutionOnly));
    let report = mem
        .export(config("t", vec![4, 4], dialect, OverwritePolicy::Overwrite), &image)
        .unwrap();
    assert!(report.is_complete());

    let attrs = mem.open().attributes("t").unwrap();
    assert_eq!(attrs["resolution"], serde_json::json!([1.0, 1.0]));
    assert!(!attrs.contains_key("pixelUnit"));
}

#[test]
fn filesystem_n5_and_zarr_layouts() {
    init_logger();
    let dir = tempfile::TempDir::new().unwrap();
    let (image, _) = gray16(Dimensions::new(40, 20, 1, 1, 1), 0);

    for root in ["out.n5", "out.zarr"] {
        let options = ExportOptions {
            root: dir.path().join(root),
            dataset: "raw".into(),
            block_size: "32".into(),
            compression: "gzip".into(),
            metadata: MetadataDialect::IMAGEJ.into(),
            overwrite: "Overwrite".into(),
            threads: 4,
            ..Default::default()
        };
        let report = Exporter::from_options(&options, &image, None)
            .unwrap()
            .export(&image, &NoProgress)
            .unwrap();
        assert_eq!(
            report.status("raw"),
            Some(&DatasetStatus::Written { blocks: 2 })
        );
    }

    let n5 = dir.path().join("out.n5");
    let root: serde_json::Value =
        serde_json::from_slice(&std::fs::read(n5.join("attributes.json")).unwrap()).unwrap();
    assert_eq!(root["n5"], "4.0.0");
    let edge = std::fs::read(n5.join("raw/1/0")).unwrap();
    // mode 0, two dimensions, truncated to 8 x 20
    assert_eq!(&edge[..12], &[0, 0, 0, 2, 0, 0, 0, 8, 0, 0, 0, 20]);

    let zarr = dir.path().join("out.zarr");
    let zarray: serde_json::Value =
        serde_json::from_slice(&std::fs::read(zarr.join("raw/.zarray")).unwrap()).unwrap();
    assert_eq!(zarray["shape"], serde_json::json!([20, 40]));
    assert_eq!(zarray["chunks"], serde_json::json!([20, 32]));
    assert_eq!(zarray["dtype"], ">u2");
    assert!(zarr.join(".zgroup").exists());
    assert!(zarr.join("raw/0/1").exists());
    let zattrs: serde_json::Value =
        serde_json::from_slice(&std::fs::read(zarr.join("raw/.zattrs")).unwrap()).unwrap();
    assert_eq!(zattrs["numChannels"], 1);
}

#[test]
fn blosc_blocks_round_trip_in_both_layouts() {
    for format in [ContainerFormat::N5, ContainerFormat::Zarr] {
        let mem = MemoryContainer::new(format);
        let (image, data) = gray16(Dimensions::new(12, 10, 1, 1, 1), 300);
        let mut config = config("b", vec![8, 8], MetadataDialect::None, OverwritePolicy::Overwrite);
        config.compression = N5Compression::blosc();
        let report = mem.export(config, &image).unwrap();
        assert_eq!(report.status("b"), Some(&DatasetStatus::Written { blocks: 4 }));

        let container = mem.open();
        assert_eq!(
            container.dataset_attributes("b").unwrap().compression,
            N5Compression::blosc()
        );
        assert_eq!(read_u16(&container, "b", &[0, 0], &[12, 10]), data);
    }
}

#[derive(Debug)]
struct Failing;

impl TemplateMapper for Failing {
    fn map(&self, _imagej: &serde_json::Value) -> Result<serde_json::Value> {
        Err(Error::general("template unavailable"))
    }
}

#[derive(Debug)]
struct ClaimsDimensions;

impl TemplateMapper for ClaimsDimensions {
    fn map(&self, _imagej: &serde_json::Value) -> Result<serde_json::Value> {
        Ok(serde_json::json!({ "dimensions": [1, 1] }))
    }
}

#[test]
fn metadata_failure_keeps_the_pixels() {
    let mappers: [Arc<dyn TemplateMapper>; 2] = [Arc::new(Failing), Arc::new(ClaimsDimensions)];
    for mapper in mappers {
        let mem = MemoryContainer::new(ContainerFormat::N5);
        let (image, data) = gray16(Dimensions::new(6, 5, 1, 1, 1), 11);
        let dialect = MetadataDialect::Custom(mapper);
        let report = mem
            .export(config("t", vec![4, 4], dialect, OverwritePolicy::Overwrite), &image)
            .unwrap();

        assert_eq!(report.status("t"), Some(&DatasetStatus::Written { blocks: 4 }));
        assert_eq!(report.metadata_failures.len(), 1);
        assert_eq!(report.metadata_failures[0].path, "t");
        assert!(!report.is_complete());

        let container = mem.open();
        assert_eq!(container.dataset_attributes("t").unwrap().dimensions, vec![6, 5]);
        assert_eq!(read_u16(&container, "t", &[0, 0], &[6, 5]), data);
    }
}

#[test]
fn failed_channel_does_not_stop_siblings() {
    let mem = MemoryContainer::new(ContainerFormat::N5);
    let dims = Dimensions::new(4, 4, 1, 1, 1);
    let bytes = PixelArray::Gray8(column_major(&dims.shape(), vec![9u8; 16]).unwrap());
    let single = Image::new("bytes", dims, bytes).unwrap();
    mem.export(
        config("r/c0/s0", vec![4, 4], MetadataDialect::None, OverwritePolicy::Overwrite),
        &single,
    )
    .unwrap();

    let (image, data) = gray16(Dimensions::new(4, 4, 2, 1, 1), 1);
    let policy = OverwritePolicy::MergeSubset { offset: vec![0, 0, 0] };
    let report = mem
        .export(config("r", vec![4, 4, 1], MetadataDialect::N5Viewer, policy), &image)
        .unwrap();

    assert!(matches!(report.status("r/c0/s0"), Some(DatasetStatus::Failed(_))));
    assert_eq!(
        report.status("r/c1/s0"),
        Some(&DatasetStatus::Written { blocks: 1 })
    );
    assert!(!report.is_complete());

    let container = mem.open();
    assert_eq!(
        container.dataset_attributes("r/c0/s0").unwrap().data_type,
        DataType::Uint8
    );
    assert_eq!(read_u16(&container, "r/c1/s0", &[0, 0], &[4, 4]), data[16..].to_vec());
}

#[test]
fn failed_pyramid_level_is_left_out_of_the_manifest() {
    let mem = MemoryContainer::new(ContainerFormat::N5);
    // unreadable attributes at s1 stop that level from being defined
    mem.store
        .set(
            &StoreKey::new("p/s1/attributes.json").unwrap(),
            Bytes::from_static(b"{ not json"),
        )
        .unwrap();

    let (image, _) = gray16(Dimensions::new(16, 16, 1, 1, 1), 0);
    let mut config = config("p", vec![8, 8], MetadataDialect::OmeNgff, OverwritePolicy::Overwrite);
    config.num_scales = 3;
    let report = mem.export(config, &image).unwrap();

    assert!(matches!(report.status("p/s0"), Some(DatasetStatus::Written { .. })));
    assert!(matches!(report.status("p/s1"), Some(DatasetStatus::Failed(_))));
    assert!(matches!(report.status("p/s2"), Some(DatasetStatus::Written { .. })));
    assert!(!report.is_complete());

    let manifest = report.manifest.expect("manifest written");
    let levels: Vec<&str> = manifest.levels.iter().map(|l| l.path.as_str()).collect();
    assert_eq!(levels, vec!["s0", "s2"]);
    let stored = read_multiscales(&mem.open(), "p").unwrap().expect("multiscales");
    let paths: Vec<&str> = stored[0].datasets.iter().map(|d| d.path.as_str()).collect();
    assert_eq!(paths, vec!["s0", "s2"]);
}

#[test]
fn n5_viewer_stores_frames_as_depth() {
    let mem = MemoryContainer::new(ContainerFormat::N5);
    let (image, data) = gray16(Dimensions::new(4, 4, 1, 1, 3), 0);
    let report = mem
        .export(
            config("movie", vec![4, 4, 1], MetadataDialect::N5Viewer, OverwritePolicy::Overwrite),
            &image,
        )
        .unwrap();
    assert_eq!(
        report.status("movie/c0/s0"),
        Some(&DatasetStatus::Written { blocks: 3 })
    );

    let container = mem.open();
    let attrs = container.dataset_attributes("movie/c0/s0").unwrap();
    assert_eq!(attrs.dimensions, vec![4, 4, 1, 3]);
    assert_eq!(attrs.block_size, vec![4, 4, 1, 1]);
    assert_eq!(
        read_u16(&container, "movie/c0/s0", &[0, 0, 0, 0], &[4, 4, 1, 3]),
        data
    );
}

#[test]
fn bad_configuration_leaves_root_untouched() {
    init_logger();
    let dir = tempfile::TempDir::new().unwrap();
    let (image, _) = gray16(Dimensions::new(4, 4, 1, 1, 1), 0);
    let dims = Dimensions::new(4, 4, 1, 1, 1);
    let lut = PixelArray::Color256(column_major(&dims.shape(), vec![0u8; 16]).unwrap());
    let indexed = Image::new("lut", dims, lut).unwrap();

    let cases = [
        (vec![4, 4, 4], &image, "mismatched.n5"),
        (vec![4, 4], &indexed, "indexed.n5"),
    ];
    for (block_size, image, root) in cases {
        let mut config = config("d", block_size, MetadataDialect::None, OverwritePolicy::Overwrite);
        config.root = dir.path().join(root);
        let result = Exporter::new(config).export(image, &NoProgress);
        assert!(
            matches!(result, Err(Error::Config(_) | Error::UnsupportedType(_))),
            "{root}: {result:?}"
        );
        assert!(!dir.path().join(root).exists(), "{root}");
    }
}

#[test]
fn zarr_dot_separated_dataset_keeps_its_keys() {
    let mem = MemoryContainer::new(ContainerFormat::Zarr);
    let zarray = serde_json::json!({
        "zarr_format": 2,
        "shape": [4, 8],
        "chunks": [4, 4],
        "dtype": "<u2",
        "compressor": null,
        "fill_value": 0,
        "order": "C",
        "filters": null,
    });
    mem.store
        .set(
            &StoreKey::new("d/.zarray").unwrap(),
            Bytes::from(serde_json::to_vec(&zarray).unwrap()),
        )
        .unwrap();
    let first: Vec<u8> = (1..=16u16).flat_map(|v| v.to_le_bytes()).collect();
    mem.store
        .set(&StoreKey::new("d/0.0").unwrap(), Bytes::from(first))
        .unwrap();

    let (patch, patch_data) = gray16(Dimensions::new(2, 2, 1, 1, 1), 500);
    let policy = OverwritePolicy::MergeSubset { offset: vec![5, 1] };
    let report = mem
        .export(config("d", vec![4, 4], MetadataDialect::None, policy), &patch)
        .unwrap();
    assert_eq!(report.status("d"), Some(&DatasetStatus::Written { blocks: 1 }));

    let container = mem.open();
    assert!(container.dataset_exists("d").unwrap());
    let all = read_u16(&container, "d", &[0, 0], &[8, 4]);
    for y in 0..4u16 {
        for x in 0..8u16 {
            let expected = match (x, y) {
                (0..4, _) => 1 + x + 4 * y,
                (5..7, 1..3) => patch_data[(x - 5 + 2 * (y - 1)) as usize],
                _ => 0,
            };
            assert_eq!(all[(x + 8 * y) as usize], expected, "pixel ({x}, {y})");
        }
    }
    let stored = |key: &str| {
        mem.store.get(&StoreKey::new(key).unwrap()).unwrap().is_some()
    };
    assert!(stored("d/0.1"));
    assert!(!stored("d/0/1"));
}
