//! Parameter uniform packing
//!
//! All parameters of an effect live in one uniform struct, laid out in declaration
//! order with WGSL uniform alignment rules. [`ParameterLayout`] computes the offsets
//! and the WGSL struct text; [`ParameterBlock`] holds the current values and their
//! packed byte image, ready for `Queue::write_buffer`.

use crate::error::CompileError;
use crate::ir::{ParameterInfo, ParameterType, ParameterValue, ScalarType};
use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};

/// WGSL name of the parameter struct
pub const PARAMETERS_STRUCT: &str = "WgfxParams";

/// Returns `(align, size)` of a parameter type in the uniform address space
fn align_and_size(ty: ParameterType) -> (u32, u32) {
    match ty.components {
        1 => (4, 4),
        2 => (8, 8),
        3 => (16, 12),
        _ => (16, 16),
    }
}

/// Placement of one parameter inside the uniform buffer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldLayout {
    pub name: String,
    pub ty: ParameterType,
    /// Byte offset from the start of the buffer
    pub offset: u32,
    /// Size in bytes, excluding padding
    pub size: u32,
}

/// Byte layout of the parameter uniform
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterLayout {
    pub fields: Vec<FieldLayout>,
    /// Buffer size in bytes, a multiple of 16
    pub size: u32,
}

impl ParameterLayout {
    /// Lays out parameters in declaration order
    pub fn new(parameters: &[ParameterInfo]) -> Self {
        let mut fields = Vec::with_capacity(parameters.len());
        let mut offset: u32 = 0;
        for parameter in parameters {
            let (align, size) = align_and_size(parameter.ty);
            offset = offset.next_multiple_of(align);
            fields.push(FieldLayout {
                name: parameter.name.clone(),
                ty: parameter.ty,
                offset,
                size,
            });
            offset += size;
        }
        Self {
            fields,
            size: offset.next_multiple_of(16),
        }
    }

    /// Returns true if the effect has no parameters
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Looks up a field by parameter name
    pub fn field(&self, name: &str) -> Option<&FieldLayout> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// WGSL declaration of the parameter struct, or `None` if there are no parameters
    pub fn wgsl_struct(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        let mut out = format!("struct {PARAMETERS_STRUCT} {{\n");
        for field in &self.fields {
            out.push_str(&format!("    {}: {},\n", field.name, field.ty.wgsl_name()));
        }
        out.push_str("}\n");
        Some(out)
    }
}

/// Current parameter values and their packed uniform image
#[derive(Debug, Clone)]
pub struct ParameterBlock {
    layout: ParameterLayout,
    parameters: Vec<ParameterInfo>,
    values: Vec<ParameterValue>,
    data: BytesMut,
}

impl ParameterBlock {
    /// Creates a block holding every parameter's default value
    pub fn new(parameters: &[ParameterInfo]) -> Self {
        let layout = ParameterLayout::new(parameters);
        let mut block = Self {
            data: BytesMut::zeroed(layout.size as usize),
            layout,
            parameters: parameters.to_vec(),
            values: parameters.iter().map(|p| p.default.clone()).collect(),
        };
        for index in 0..block.values.len() {
            let clamped = clamp(&block.parameters[index], block.values[index].clone());
            block.write(index, clamped);
        }
        block
    }

    /// Byte layout of the block
    pub fn layout(&self) -> &ParameterLayout {
        &self.layout
    }

    /// Packed uniform image
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Current value of a parameter
    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        let index = self.parameters.iter().position(|p| p.name == name)?;
        self.values.get(index)
    }

    /// Parameter declarations paired with their current values
    pub fn iter(&self) -> impl Iterator<Item = (&ParameterInfo, &ParameterValue)> {
        self.parameters.iter().zip(&self.values)
    }

    /// Updates a parameter, clamping it to the declared range
    ///
    /// Integer values are accepted for float parameters. Returns the value that was
    /// actually stored.
    ///
    /// # Errors
    /// [`CompileError::Resolution`] if the name is unknown or the value does not fit the type.
    pub fn set(&mut self, name: &str, value: ParameterValue) -> Result<ParameterValue, CompileError> {
        let index = self
            .parameters
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| CompileError::resolution(None, name, "no parameter with this name"))?;
        let parameter = &self.parameters[index];
        let value = coerce(parameter.ty, value).ok_or_else(|| CompileError::resolution(None, name, format!("value does not match parameter type {}", parameter.ty.directive_name())))?;
        let value = clamp(parameter, value);
        self.write(index, value.clone());
        Ok(value)
    }

    fn write(&mut self, index: usize, value: ParameterValue) {
        let field = &self.layout.fields[index];
        let mut encoded = BytesMut::with_capacity(field.size as usize);
        match &value {
            ParameterValue::Float(v) => encoded.put_f32_le(*v),
            ParameterValue::Int(v) => encoded.put_i32_le(*v),
            ParameterValue::FloatVec(values) => values.iter().for_each(|v| encoded.put_f32_le(*v)),
            ParameterValue::IntVec(values) => values.iter().for_each(|v| encoded.put_i32_le(*v)),
        }
        let start = field.offset as usize;
        self.data[start..start + encoded.len()].copy_from_slice(&encoded);
        self.values[index] = value;
    }
}

/// Converts a value to the exact shape of `ty`, if compatible
fn coerce(ty: ParameterType, value: ParameterValue) -> Option<ParameterValue> {
    if value.components() != ty.components as usize {
        return None;
    }
    let coerced = match (ty.scalar, value) {
        (ScalarType::Float, ParameterValue::Float(v)) => ParameterValue::Float(v),
        (ScalarType::Float, ParameterValue::Int(v)) => ParameterValue::Float(v as f32),
        (ScalarType::Float, ParameterValue::FloatVec(v)) => ParameterValue::FloatVec(v),
        (ScalarType::Float, ParameterValue::IntVec(v)) => ParameterValue::FloatVec(v.into_iter().map(|x| x as f32).collect()),
        (ScalarType::Int, ParameterValue::Int(v)) => ParameterValue::Int(v),
        (ScalarType::Int, ParameterValue::IntVec(v)) => ParameterValue::IntVec(v),
        (ScalarType::Int, _) => return None,
    };
    // scalar-shaped vectors are stored as scalars and vice versa
    Some(match (ty.components, coerced) {
        (1, ParameterValue::FloatVec(v)) => ParameterValue::Float(v[0]),
        (1, ParameterValue::IntVec(v)) => ParameterValue::Int(v[0]),
        (_, other) => other,
    })
}

/// Clamps every component to the parameter's declared range
fn clamp(parameter: &ParameterInfo, value: ParameterValue) -> ParameterValue {
    let min = parameter.min.unwrap_or(f32::NEG_INFINITY);
    let max = parameter.max.unwrap_or(f32::INFINITY);
    let clamp_f = |v: f32| v.clamp(min, max);
    // i32 is exact in f64 but not in f32
    let (min_i, max_i) = (f64::from(min).ceil(), f64::from(max).floor());
    let clamp_i = |v: i32| f64::from(v).max(min_i).min(max_i) as i32;
    match value {
        ParameterValue::Float(v) => ParameterValue::Float(clamp_f(v)),
        ParameterValue::Int(v) => ParameterValue::Int(clamp_i(v)),
        ParameterValue::FloatVec(v) => ParameterValue::FloatVec(v.into_iter().map(clamp_f).collect()),
        ParameterValue::IntVec(v) => ParameterValue::IntVec(v.into_iter().map(clamp_i).collect()),
    }
}
