//! Chipping of large images and superpixel segmentation behind one interface.
//!
//! A large frame is cut into overlapping, fixed-size chips ([`chipping::Chipping`]). Every chip
//! is segmented by a backend implementing [`superpixel::Superpixel`]:
//!
//! * [`superpixel::SlicSuperpixel`], an iterative SLIC on the CPU. Accepts any input size and
//!   also implements [`superpixel::SuperpixelLabels`] (label map and segment count).
//! * [`realtime::RealtimeSlic`], a fixed-configuration engine working on preallocated
//!   4-channel device images. It only draws contours; labels are not available and
//!   `labels()` says so.
//!
//! [`pipeline::ChipPipeline`] ties both together with a feature extractor, the way a batch
//! job walks an image chip by chip.
//!
//! Frames are 3-channel, 8-bit, interleaved. Inputs are BGR by convention.
//!
//! ```rust
//! use superpixel_chips::arrays::{Frame, LabelMap, Size};
//! use superpixel_chips::chipping::Chipping;
//! use superpixel_chips::common::SlicConfig;
//! use superpixel_chips::superpixel::{SlicSuperpixel, Superpixel, SuperpixelLabels};
//!
//! let frame = Frame::from_fn(640, 480, |x, y| [(x % 256) as u8, (y % 256) as u8, 128]).unwrap();
//! let chips = Chipping::new(frame.size(), Size::new(256, 256), 0.5).unwrap();
//! let mut slic = SlicSuperpixel::new(SlicConfig::default()).unwrap();
//! let mut labels = LabelMap::empty();
//! for (_, roi) in chips.iter() {
//!     let n = slic.compute(frame.roi(roi)).num_superpixels();
//!     slic.get_labels(&mut labels);
//!     assert!(labels.data.iter().all(|l| (0..n as i32).contains(l)));
//! }
//! ```
//!
//! It's strongly recommended to use this in release build. The SLIC core uses unsafe code and
//! the `assume!` macro to avoid boundary checks in hot loops in release builds.

pub mod arrays;
pub mod assign;
pub mod chipping;
pub mod cielab;
pub mod cluster;
pub mod common;
pub mod conectivity;
pub mod device;
pub mod pipeline;
pub mod realtime;
pub mod region;
pub mod slic;
pub mod superpixel;

pub use common::Error;
