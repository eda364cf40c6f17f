use crate::common::ColorSpace;
use assume::assume;
use tables::{C_B, LAB_SHIFT, LAB_TBL, OUTPUT_SHIFT, SRGB_GAMMA_TBL, SRGB_SHIFT};

pub(crate) mod tables {
    use static_init::dynamic;
    pub const SRGB_SHIFT: u8 = 13;
    const SRGB_MAX: usize = 1 << SRGB_SHIFT;
    pub const OUTPUT_SHIFT: u8 = 1;
    pub const LAB_SHIFT: u8 = 16;
    /// sRGB (D65) to XYZ matrix, rows pre-divided by the white point, in 16-bit fixed point.
    pub const C_B: [u32; 9] = [28440, 24656, 12442, 13938, 46868, 4730, 1164, 7175, 57202];
    #[dynamic(65535)]
    pub static SRGB_GAMMA_TBL: [u32; 256] =
        core::array::from_fn(|i| (calculate_xyz_nonlin(i as u8) * SRGB_MAX as f32) as u32);
    #[dynamic(65535)]
    pub static LAB_TBL: [i32; SRGB_MAX + 1] = core::array::from_fn(|i| {
        (calculate_lab_nonlin(i as f32 / SRGB_MAX as f32) * SRGB_MAX as f32).round() as i32
    });

    fn calculate_xyz_nonlin(a: u8) -> f32 {
        let v: f64 = a as f64 / 255.0;
        if v <= 0.04045 {
            return (v / 12.92) as f32;
        }
        ((v + 0.055) / 1.055).powf(2.4) as f32
    }

    fn calculate_lab_nonlin(a: f32) -> f32 {
        debug_assert!(a >= 0.0);
        if a < 0.008856 {
            return 7.787 * a + 0.137931;
        }
        a.powf(0.333333)
    }
}

/// Converts an RGB pixel to the channels clustering works on in `space`.
#[inline(always)]
pub fn convert_pixel(rgb: [u8; 3], space: ColorSpace) -> [u8; 3] {
    match space {
        ColorSpace::CieLab => srgb_to_cielab_pixel(&rgb),
        ColorSpace::Xyz => srgb_to_xyz_pixel(&rgb),
        ColorSpace::Rgb => rgb,
    }
}

/// White-point normalized linear XYZ in fixed point, each channel in `0..=1 << SRGB_SHIFT`.
#[inline(always)]
fn srgb_to_xyz_fixed(rgb: &[u8]) -> [u32; 3] {
    let sr = unsafe { SRGB_GAMMA_TBL[rgb[0] as usize] };
    let sg = unsafe { SRGB_GAMMA_TBL[rgb[1] as usize] };
    let sb = unsafe { SRGB_GAMMA_TBL[rgb[2] as usize] };
    let xr = (C_B[0] * sr + C_B[1] * sg + C_B[2] * sb) >> LAB_SHIFT;
    let yr = (C_B[3] * sr + C_B[4] * sg + C_B[5] * sb) >> LAB_SHIFT;
    let zr = (C_B[6] * sr + C_B[7] * sg + C_B[8] * sb) >> LAB_SHIFT;
    [xr, yr, zr]
}

/// Convert pixel in RGB24 to linear XYZ scaled to 0..=255 (relative to the D65 white).
#[inline(always)]
pub fn srgb_to_xyz_pixel(rgb: &[u8]) -> [u8; 3] {
    let [xr, yr, zr] = srgb_to_xyz_fixed(rgb);
    [
        (xr >> (SRGB_SHIFT - 8)).min(255) as u8,
        (yr >> (SRGB_SHIFT - 8)).min(255) as u8,
        (zr >> (SRGB_SHIFT - 8)).min(255) as u8,
    ]
}

/// Convert pixel in RGB24 to Lab24. This is an approximation.
///
/// The output range is for:
///  - L - from 0 to 200
///  - a - from 0 to 255 (some values are clamped)
///  - b - from 0 to 255 (some values are clamped)
#[inline(always)]
pub fn srgb_to_cielab_pixel(rgb: &[u8]) -> [u8; 3] {
    let [xr, yr, zr] = srgb_to_xyz_fixed(rgb);
    assume!(unsafe: xr < LAB_TBL.len() as u32);
    assume!(unsafe: yr < LAB_TBL.len() as u32);
    assume!(unsafe: zr < LAB_TBL.len() as u32);
    let fx = unsafe { LAB_TBL[xr as usize] };
    let fy = unsafe { LAB_TBL[yr as usize] };
    let fz = unsafe { LAB_TBL[zr as usize] };
    let ciel = 116 * fy - (16 << SRGB_SHIFT);
    let ciea = 500 * (fx - fy) + (128 << SRGB_SHIFT);
    let cieb = 200 * (fy - fz) + (128 << SRGB_SHIFT);
    assume!(unsafe: ciel >= 0);
    assume!(unsafe: ciea >= 0);
    assume!(unsafe: cieb >= 0);
    let l: u8 = (ciel as u32 >> (SRGB_SHIFT - OUTPUT_SHIFT)) as u8;
    let a: u8 = ((ciea >> (SRGB_SHIFT - OUTPUT_SHIFT)) - (64 << OUTPUT_SHIFT)).clamp(0, 255) as u8;
    let b: u8 = ((cieb >> (SRGB_SHIFT - OUTPUT_SHIFT)) - (64 << OUTPUT_SHIFT)).clamp(0, 255) as u8;
    [l, a, b]
}
