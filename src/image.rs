//! In-memory images and the strided pixel views the exporter writes from.
use std::collections::BTreeMap;

use ndarray::{ArrayD, ArrayViewD, Axis, IxDyn, ShapeBuilder, Slice};

use crate::metadata::DataType;
use crate::{Error, Result};

/// Pixel storage of an ImageJ-style image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelType {
    Gray8,
    Gray16,
    Gray32,
    /// Packed ARGB.
    ColorRgb,
    /// 8-bit indices into a lookup table.
    Color256,
}

impl PixelType {
    /// Container element type for this pixel type.
    pub fn data_type(&self) -> Result<DataType> {
        match self {
            PixelType::Gray8 => Ok(DataType::Uint8),
            PixelType::Gray16 => Ok(DataType::Uint16),
            PixelType::Gray32 => Ok(DataType::Float32),
            PixelType::ColorRgb => Ok(DataType::Uint32),
            PixelType::Color256 => Err(Error::UnsupportedType(self.name().into())),
        }
    }

    /// ImageJ name, e.g. `GRAY16`.
    pub fn name(&self) -> &'static str {
        match self {
            PixelType::Gray8 => "GRAY8",
            PixelType::Gray16 => "GRAY16",
            PixelType::Gray32 => "GRAY32",
            PixelType::ColorRgb => "COLOR_RGB",
            PixelType::Color256 => "COLOR_256",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisType {
    X,
    Y,
    Channel,
    Z,
    Time,
}

impl AxisType {
    pub fn is_spatial(&self) -> bool {
        matches!(self, AxisType::X | AxisType::Y | AxisType::Z)
    }

    /// Short axis name as used by NGFF.
    pub fn name(&self) -> &'static str {
        match self {
            AxisType::X => "x",
            AxisType::Y => "y",
            AxisType::Channel => "c",
            AxisType::Z => "z",
            AxisType::Time => "t",
        }
    }

    /// NGFF axis type.
    pub fn kind(&self) -> &'static str {
        match self {
            AxisType::X | AxisType::Y | AxisType::Z => "space",
            AxisType::Channel => "channel",
            AxisType::Time => "time",
        }
    }
}

/// Physical calibration of an image, ImageJ style.
///
/// Origins are in pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct Calibration {
    pub pixel_width: f64,
    pub pixel_height: f64,
    pub pixel_depth: f64,
    pub unit: String,
    pub x_origin: f64,
    pub y_origin: f64,
    pub z_origin: f64,
    pub frame_interval: f64,
    pub time_unit: String,
    pub fps: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            pixel_width: 1.0,
            pixel_height: 1.0,
            pixel_depth: 1.0,
            unit: "pixel".into(),
            x_origin: 0.0,
            y_origin: 0.0,
            z_origin: 0.0,
            frame_interval: 0.0,
            time_unit: "sec".into(),
            fps: 0.0,
        }
    }
}

impl Calibration {
    /// Physical size of one step along `axis`.
    pub fn scale(&self, axis: AxisType) -> f64 {
        match axis {
            AxisType::X => self.pixel_width,
            AxisType::Y => self.pixel_height,
            AxisType::Z => self.pixel_depth,
            AxisType::Time if self.frame_interval > 0.0 => self.frame_interval,
            AxisType::Time | AxisType::Channel => 1.0,
        }
    }

    /// Physical position of pixel 0 along `axis`.
    pub fn translation(&self, axis: AxisType) -> f64 {
        match axis {
            AxisType::X => 0.0 - self.x_origin * self.pixel_width,
            AxisType::Y => 0.0 - self.y_origin * self.pixel_height,
            AxisType::Z => 0.0 - self.z_origin * self.pixel_depth,
            AxisType::Time | AxisType::Channel => 0.0,
        }
    }

    /// Unit of `axis`; channels have none.
    pub fn unit(&self, axis: AxisType) -> Option<&str> {
        match axis {
            AxisType::X | AxisType::Y | AxisType::Z => Some(&self.unit),
            AxisType::Time => Some(&self.time_unit),
            AxisType::Channel => None,
        }
    }
}

/// Extents of the five ImageJ axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u64,
    pub height: u64,
    pub channels: u64,
    pub slices: u64,
    pub frames: u64,
}

impl Dimensions {
    pub fn new(width: u64, height: u64, channels: u64, slices: u64, frames: u64) -> Self {
        Self {
            width,
            height,
            channels,
            slices,
            frames,
        }
    }

    /// X and Y, then every non-singleton C, Z and T axis, in that order.
    pub fn axes(&self) -> Vec<AxisType> {
        let mut axes = vec![AxisType::X, AxisType::Y];
        if self.channels > 1 {
            axes.push(AxisType::Channel);
        }
        if self.slices > 1 {
            axes.push(AxisType::Z);
        }
        if self.frames > 1 {
            axes.push(AxisType::Time);
        }
        axes
    }

    pub fn shape(&self) -> Vec<u64> {
        self.axes()
            .iter()
            .map(|a| match a {
                AxisType::X => self.width,
                AxisType::Y => self.height,
                AxisType::Channel => self.channels,
                AxisType::Z => self.slices,
                AxisType::Time => self.frames,
            })
            .collect()
    }
}

/// Pixel element handed to the array in native byte order.
pub trait Element: Copy + Send + Sync + 'static {
    fn extend_ne(self, out: &mut Vec<u8>);
}

macro_rules! impl_element {
    ($($t:ty),*) => {
        $(
            impl Element for $t {
                fn extend_ne(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_ne_bytes());
                }
            }
        )*
    };
}

impl_element!(u8, u16, u32, f32);

/// Owned pixel data, first axis (X) fastest in memory.
#[derive(Debug, Clone)]
pub enum PixelArray {
    Gray8(ArrayD<u8>),
    Gray16(ArrayD<u16>),
    Gray32(ArrayD<f32>),
    ColorRgb(ArrayD<u32>),
    Color256(ArrayD<u8>),
}

impl PixelArray {
    pub fn pixel_type(&self) -> PixelType {
        match self {
            PixelArray::Gray8(_) => PixelType::Gray8,
            PixelArray::Gray16(_) => PixelType::Gray16,
            PixelArray::Gray32(_) => PixelType::Gray32,
            PixelArray::ColorRgb(_) => PixelType::ColorRgb,
            PixelArray::Color256(_) => PixelType::Color256,
        }
    }

    fn shape(&self) -> &[usize] {
        match self {
            PixelArray::Gray8(a) | PixelArray::Color256(a) => a.shape(),
            PixelArray::Gray16(a) => a.shape(),
            PixelArray::Gray32(a) => a.shape(),
            PixelArray::ColorRgb(a) => a.shape(),
        }
    }

    fn view(&self) -> PixelData<'_> {
        match self {
            PixelArray::Gray8(a) | PixelArray::Color256(a) => PixelData::U8(a.view()),
            PixelArray::Gray16(a) => PixelData::U16(a.view()),
            PixelArray::Gray32(a) => PixelData::F32(a.view()),
            PixelArray::ColorRgb(a) => PixelData::U32(a.view()),
        }
    }
}

/// Build a first-axis-fastest array from a flat ImageJ-ordered buffer.
pub fn column_major<T>(shape: &[u64], data: Vec<T>) -> Result<ArrayD<T>> {
    let shape: Vec<usize> = shape.iter().map(|&n| n as usize).collect();
    ArrayD::from_shape_vec(IxDyn(&shape).f(), data).map_err(Error::wrap)
}

/// An image held in memory for the duration of an export.
#[derive(Debug, Clone)]
pub struct Image {
    title: String,
    dimensions: Dimensions,
    pixels: PixelArray,
    calibration: Calibration,
    properties: BTreeMap<String, String>,
}

impl Image {
    /// `pixels` must have the shape of `dimensions.shape()`.
    pub fn new(
        title: impl Into<String>,
        dimensions: Dimensions,
        pixels: PixelArray,
    ) -> Result<Self> {
        let expected: Vec<usize> = dimensions.shape().iter().map(|&n| n as usize).collect();
        if pixels.shape() != expected.as_slice() {
            return Err(Error::general(format!(
                "pixel array has shape {:?}, expected {expected:?}",
                pixels.shape()
            )));
        }
        Ok(Self {
            title: title.into(),
            dimensions,
            pixels,
            calibration: Calibration::default(),
            properties: BTreeMap::new(),
        })
    }

    pub fn with_calibration(mut self, calibration: Calibration) -> Self {
        self.calibration = calibration;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    pub fn axes(&self) -> Vec<AxisType> {
        self.dimensions.axes()
    }

    pub fn shape(&self) -> Vec<u64> {
        self.dimensions.shape()
    }

    pub fn num_dimensions(&self) -> usize {
        self.axes().len()
    }

    pub fn num_channels(&self) -> u64 {
        self.dimensions.channels
    }

    pub fn num_slices(&self) -> u64 {
        self.dimensions.slices
    }

    pub fn num_frames(&self) -> u64 {
        self.dimensions.frames
    }

    /// Index of the channel axis, if there is more than one channel.
    pub fn channel_axis(&self) -> Option<usize> {
        self.axes().iter().position(|a| *a == AxisType::Channel)
    }

    pub fn pixel_type(&self) -> PixelType {
        self.pixels.pixel_type()
    }

    pub fn data_type(&self) -> Result<DataType> {
        self.pixel_type().data_type()
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    /// View of every pixel.
    pub fn view(&self) -> PixelView<'_> {
        PixelView::new(self.pixels.view())
    }

    /// View of one channel, without the channel axis.
    ///
    /// Images with a single channel have no channel axis and return the whole view.
    pub fn channel_view(&self, channel: u64) -> Result<PixelView<'_>> {
        match self.channel_axis() {
            Some(axis) if channel < self.num_channels() => {
                Ok(self.view().hyperslice(axis, channel))
            }
            None if channel == 0 => Ok(self.view()),
            _ => Err(Error::general(format!(
                "channel {channel} out of range for {} channels",
                self.num_channels()
            ))),
        }
    }
}

#[derive(Debug, Clone)]
enum PixelData<'a> {
    U8(ArrayViewD<'a, u8>),
    U16(ArrayViewD<'a, u16>),
    U32(ArrayViewD<'a, u32>),
    F32(ArrayViewD<'a, f32>),
}

macro_rules! map_pixels {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            PixelData::U8($v) => PixelData::U8($body),
            PixelData::U16($v) => PixelData::U16($body),
            PixelData::U32($v) => PixelData::U32($body),
            PixelData::F32($v) => PixelData::F32($body),
        }
    };
}

macro_rules! with_pixels {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            PixelData::U8($v) => $body,
            PixelData::U16($v) => $body,
            PixelData::U32($v) => $body,
            PixelData::F32($v) => $body,
        }
    };
}

/// A borrowed, possibly strided view of pixels placed at an offset in a dataset.
#[derive(Debug, Clone)]
pub struct PixelView<'a> {
    data: PixelData<'a>,
    offset: Vec<u64>,
}

impl<'a> PixelView<'a> {
    fn new(data: PixelData<'a>) -> Self {
        let ndim = with_pixels!(&data, v => v.ndim());
        Self {
            data,
            offset: vec![0; ndim],
        }
    }

    pub fn ndim(&self) -> usize {
        self.offset.len()
    }

    pub fn shape(&self) -> Vec<u64> {
        with_pixels!(&self.data, v => v.shape().iter().map(|&n| n as u64).collect())
    }

    /// Element type of the pixels.
    pub fn data_type(&self) -> DataType {
        match self.data {
            PixelData::U8(_) => DataType::Uint8,
            PixelData::U16(_) => DataType::Uint16,
            PixelData::U32(_) => DataType::Uint32,
            PixelData::F32(_) => DataType::Float32,
        }
    }

    /// Position of the view's first pixel in dataset coordinates.
    pub fn offset(&self) -> &[u64] {
        &self.offset
    }

    /// Smallest dataset extent that holds this view.
    pub fn end(&self) -> Vec<u64> {
        self.offset
            .iter()
            .zip(self.shape())
            .map(|(o, n)| o + n)
            .collect()
    }

    /// Place the view at `offset`.
    pub fn translated(mut self, offset: &[u64]) -> Result<Self> {
        if offset.len() != self.ndim() {
            return Err(Error::config(format!(
                "offset {offset:?} has {} entries, image has {} dimensions",
                offset.len(),
                self.ndim()
            )));
        }
        self.offset = offset.to_vec();
        Ok(self)
    }

    /// Fix `axis` at `index` and drop it.
    pub fn hyperslice(self, axis: usize, index: u64) -> Self {
        let mut offset = self.offset;
        offset.remove(axis);
        let data = map_pixels!(self.data, v => v.index_axis_move(Axis(axis), index as usize));
        Self { data, offset }
    }

    /// Take every `factors[d]`-th pixel along each axis, starting at 0.
    pub fn subsampled(self, factors: &[u64]) -> Self {
        let data = map_pixels!(self.data, v => {
            let mut v = v;
            v.slice_each_axis_inplace(|ax| {
                Slice::new(0, None, factors[ax.axis.index()].max(1) as isize)
            });
            v
        });
        Self {
            data,
            offset: self.offset,
        }
    }

    /// Insert a singleton axis at position `at`.
    pub fn with_depth_axis(self, at: usize) -> Self {
        let mut offset = self.offset;
        offset.insert(at, 0);
        let data = map_pixels!(self.data, v => v.insert_axis(Axis(at)));
        Self { data, offset }
    }

    /// Native-endian bytes of the box at `origin` (view-local) of extent `extent`, first axis fastest.
    pub fn read_box(&self, origin: &[u64], extent: &[u64]) -> Vec<u8> {
        with_pixels!(&self.data, v => {
            let region = v.slice_each_axis(|ax| {
                let i = ax.axis.index();
                let start = origin[i] as isize;
                Slice::from(start..start + extent[i] as isize)
            });
            let mut out = Vec::with_capacity(region.len() * element_size(&region));
            // the transposed view iterates axis 0 fastest
            for px in region.t().iter() {
                px.extend_ne(&mut out);
            }
            out
        })
    }
}

fn element_size<T>(_: &ArrayViewD<'_, T>) -> usize {
    std::mem::size_of::<T>()
}
