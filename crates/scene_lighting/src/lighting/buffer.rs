//! Packed GPU light buffer
//!
//! Fills a continuous float buffer with per-light records using configurable
//! field offsets and stride, so the upload to the GPU is a single flat copy.
//! The buffer starts out in a built-in default layout and can be re-laid-out
//! once the real offsets are known from driver introspection.

use std::mem;

use crate::foundation::math::{Mat4, Vec4};

/// Largest uniform block size the shared-buffer tier relies on
pub const MAX_UBO_BYTES: usize = 16 * 1024;

/// Field slots within one packed light record
#[derive(Debug, Clone, Copy)]
enum Field {
    Diffuse = 0,
    Ambient = 1,
    Specular = 2,
    DiffuseSign = 3,
    Position = 4,
    AttenuationRadius = 5,
}

/// Per-field float offsets plus record stride, in floats
#[derive(Debug, Clone)]
struct Offsets {
    stride: usize,
    values: [usize; 6],
}

impl Offsets {
    /// Built-in tightly packed layout used before driver introspection
    fn default_layout() -> Self {
        Self {
            stride: 12,
            values: [0, 1, 2, 3, 4, 8],
        }
    }

    /// Layout from driver-reported byte offsets and array stride
    fn shared_layout(
        offset_colors: usize,
        offset_position: usize,
        offset_attenuation_radius: usize,
        array_stride: usize,
    ) -> Self {
        const FLOAT: usize = mem::size_of::<f32>();
        let diffuse = offset_colors / FLOAT;

        Self {
            stride: (offset_attenuation_radius + 4 * FLOAT + array_stride) / FLOAT,
            values: [
                diffuse,
                diffuse + 1,
                diffuse + 2,
                diffuse + 3,
                offset_position / FLOAT,
                offset_attenuation_radius / FLOAT,
            ],
        }
    }

    fn get(&self, index: usize, field: Field) -> usize {
        self.stride * index + self.values[field as usize]
    }
}

/// Flat packed buffer of light records in GPU memory layout
///
/// Colors are packed as four unsigned-normalized bytes per word; position
/// and attenuation/radius are raw 4-float vectors. Negative (subtractive)
/// diffuse colors are stored positively with a sign marker in the otherwise
/// unused fourth color word.
pub struct LightBuffer {
    data: Vec<f32>,
    count: usize,
    offsets: Offsets,
    cached_sun_pos: Vec4,
    dirty: bool,
}

impl LightBuffer {
    /// Create a buffer holding `count` records in the default layout
    pub fn new(count: usize) -> Self {
        Self {
            data: vec![0.0; 3 * 4 * count],
            count,
            offsets: Offsets::default_layout(),
            cached_sun_pos: Vec4::zeros(),
            dirty: false,
        }
    }

    /// Number of records the buffer is sized for
    pub fn capacity(&self) -> usize {
        self.count
    }

    /// Byte size needed for `count` records under the default layout
    pub const fn query_block_size(count: usize) -> usize {
        3 * 4 * mem::size_of::<f32>() * count
    }

    /// Store a diffuse color, preserving its sign through the marker word
    pub fn set_diffuse(&mut self, index: usize, value: &Vec4) {
        // Negative lights pass a sign bit in the unused alpha word, since
        // unsigned-normalized storage cannot hold them directly.
        let (color, sign) = if value.x < 0.0 {
            (-value, !0u32)
        } else {
            (*value, 1u32)
        };
        self.write_word(self.offset(index, Field::Diffuse), pack_rgba(&color));
        self.write_word(self.offset(index, Field::DiffuseSign), sign);
    }

    /// Store an ambient color
    pub fn set_ambient(&mut self, index: usize, value: &Vec4) {
        self.write_word(self.offset(index, Field::Ambient), pack_rgba(value));
    }

    /// Store a specular color
    pub fn set_specular(&mut self, index: usize, value: &Vec4) {
        self.write_word(self.offset(index, Field::Specular), pack_rgba(value));
    }

    /// Store a position vector
    pub fn set_position(&mut self, index: usize, value: &Vec4) {
        self.write_vec4(self.offset(index, Field::Position), value);
    }

    /// Store constant/linear/quadratic attenuation plus radius
    pub fn set_attenuation_radius(&mut self, index: usize, value: &Vec4) {
        self.write_vec4(self.offset(index, Field::AttenuationRadius), value);
    }

    /// Read back a diffuse color, sign applied
    pub fn diffuse(&self, index: usize) -> Vec4 {
        let color = unpack_rgba(self.read_word(self.offset(index, Field::Diffuse)));
        if self.read_word(self.offset(index, Field::DiffuseSign)) == !0u32 {
            -color
        } else {
            color
        }
    }

    /// Read back an ambient color
    pub fn ambient(&self, index: usize) -> Vec4 {
        unpack_rgba(self.read_word(self.offset(index, Field::Ambient)))
    }

    /// Read back a specular color
    pub fn specular(&self, index: usize) -> Vec4 {
        unpack_rgba(self.read_word(self.offset(index, Field::Specular)))
    }

    /// Read back a position vector
    pub fn position(&self, index: usize) -> Vec4 {
        self.read_vec4(self.offset(index, Field::Position))
    }

    /// Read back the attenuation/radius vector
    pub fn attenuation_radius(&self, index: usize) -> Vec4 {
        self.read_vec4(self.offset(index, Field::AttenuationRadius))
    }

    /// Switch to the driver-reported layout, preserving packed records
    ///
    /// Copies every record's three quadwords from the old layout's offsets
    /// into the new layout before swapping it in. Offsets and sizes are in
    /// bytes, as reported by block introspection.
    pub fn configure_layout(
        &mut self,
        offset_colors: usize,
        offset_position: usize,
        offset_attenuation_radius: usize,
        total_size: usize,
        array_stride: usize,
    ) {
        let offsets = Offsets::shared_layout(
            offset_colors,
            offset_position,
            offset_attenuation_radius,
            array_stride,
        );

        let old = mem::replace(
            &mut self.data,
            vec![0.0; total_size / mem::size_of::<f32>()],
        );
        for index in 0..self.count {
            for field in [Field::Diffuse, Field::Position, Field::AttenuationRadius] {
                let src = self.offsets.get(index, field);
                let dst = offsets.get(index, field);
                self.data[dst..dst + 4].copy_from_slice(&old[src..src + 4]);
            }
        }
        self.offsets = offsets;
        self.dirty = true;
    }

    /// Remember the sun's world-space position for a late view transform
    ///
    /// The transform to view space must be deferred to deal with different
    /// cameras rendering the same frame (e.g. a reflection pass).
    pub fn set_cached_sun_pos(&mut self, pos: Vec4) {
        self.cached_sun_pos = pos;
    }

    /// Write the cached sun position into record 0, in view space
    pub fn upload_cached_sun_pos(&mut self, view_matrix: &Mat4) {
        let view_pos = view_matrix * self.cached_sun_pos;
        self.set_position(0, &view_pos);
    }

    /// Raw packed bytes, for upload
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    /// Whether the buffer changed since the last upload
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Clear the dirty flag after uploading
    pub fn mark_uploaded(&mut self) {
        self.dirty = false;
    }

    fn offset(&self, index: usize, field: Field) -> usize {
        assert!(
            index < self.count,
            "light record index {index} out of range (capacity {})",
            self.count
        );
        self.offsets.get(index, field)
    }

    fn write_word(&mut self, offset: usize, word: u32) {
        self.data[offset] = f32::from_bits(word);
        self.dirty = true;
    }

    fn read_word(&self, offset: usize) -> u32 {
        self.data[offset].to_bits()
    }

    fn write_vec4(&mut self, offset: usize, value: &Vec4) {
        self.data[offset..offset + 4].copy_from_slice(value.as_slice());
        self.dirty = true;
    }

    fn read_vec4(&self, offset: usize) -> Vec4 {
        Vec4::from_column_slice(&self.data[offset..offset + 4])
    }
}

/// Pack a color as four unsigned-normalized bytes in one word
///
/// Big-endian systems pack in reverse channel order so the byte sequence in
/// memory matches what the shader unpacks.
fn pack_rgba(value: &Vec4) -> u32 {
    let to_byte = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u32;
    let (r, g, b, a) = (
        to_byte(value.x),
        to_byte(value.y),
        to_byte(value.z),
        to_byte(value.w),
    );
    if cfg!(target_endian = "big") {
        (r << 24) | (g << 16) | (b << 8) | a
    } else {
        r | (g << 8) | (b << 16) | (a << 24)
    }
}

fn unpack_rgba(packed: u32) -> Vec4 {
    let from_byte = |shift: u32| ((packed >> shift) & 0xff) as f32 / 255.0;
    if cfg!(target_endian = "big") {
        Vec4::new(from_byte(24), from_byte(16), from_byte(8), from_byte(0))
    } else {
        Vec4::new(from_byte(0), from_byte(8), from_byte(16), from_byte(24))
    }
}
