//! Flat type layout: every scalar is one cell, aggregates are concatenated
//! without padding.

use super::error::{CompileError, CompileResult};
use crate::ir::Type;

/// How one index of an index path moves through an aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStep<'t> {
    /// Array element: offset is `index * stride`.
    Element { stride: i64, elem: &'t Type },
    /// Structure field: the index must be a constant.
    Field { fields: &'t [Type] },
}

pub struct TypeLayout;

impl TypeLayout {
    /// Cell count of `ty` and the type an access into it reaches.
    ///
    /// Arrays report the product of all nested extents and the innermost
    /// non-array element; structures report the sum of their fields and
    /// themselves; scalars are one cell.
    pub fn layout(ty: &Type) -> CompileResult<(u64, &Type)> {
        match ty {
            Type::Array(..) => {
                let mut cells = 1u64;
                let mut elem = ty;
                while let Type::Array(count, inner) = elem {
                    cells = cells.saturating_mul(*count);
                    elem = inner;
                }
                let (elem_cells, _) = Self::layout(elem)?;
                Ok((cells.saturating_mul(elem_cells), elem))
            }
            Type::Struct(fields) => Ok((Self::field_offset(fields, fields.len())?, ty)),
            Type::Int(_) | Type::Ptr(_) => Ok((1, ty)),
            Type::Void => Err(CompileError::unsupported(format!("type {ty} in memory layout"))),
        }
    }

    pub fn cell_count(ty: &Type) -> CompileResult<u64> {
        Self::layout(ty).map(|(cells, _)| cells)
    }

    /// Cell count of `ty` as an address stride.
    pub fn stride(ty: &Type) -> CompileResult<i64> {
        to_offset(Self::cell_count(ty)?)
    }

    /// Cells preceding field `index`.
    pub fn field_offset(fields: &[Type], index: usize) -> CompileResult<u64> {
        fields
            .iter()
            .take(index)
            .try_fold(0u64, |acc, field| Ok(acc.saturating_add(Self::cell_count(field)?)))
    }

    /// Offset and type of field `field` of a structure.
    pub fn field(fields: &[Type], field: i64) -> CompileResult<(i64, &Type)> {
        let idx = usize::try_from(field)
            .ok()
            .filter(|&idx| idx < fields.len())
            .ok_or_else(|| {
                CompileError::invariant(format!("structure field index {field} out of range"))
            })?;
        Ok((to_offset(Self::field_offset(fields, idx)?)?, &fields[idx]))
    }

    /// How an index after the first moves into `ty`.
    pub fn index_step(ty: &Type) -> CompileResult<IndexStep<'_>> {
        match ty {
            Type::Array(_, elem) => Ok(IndexStep::Element {
                stride: Self::stride(elem)?,
                elem,
            }),
            Type::Struct(fields) => Ok(IndexStep::Field { fields }),
            _ => Err(CompileError::unsupported(format!("indexing into scalar type {ty}"))),
        }
    }

    /// Cell offset of a constant index path into an object of type `source`.
    ///
    /// The first index steps over whole `source` objects; later indices walk
    /// into arrays and structures.
    pub fn constant_offset(source: &Type, indices: &[i64]) -> CompileResult<(i64, Type)> {
        let Some((&first, rest)) = indices.split_first() else {
            return Ok((0, source.clone()));
        };
        let mut offset = scaled_offset(0, first, Self::stride(source)?)?;
        let mut ty = source;
        for &index in rest {
            match Self::index_step(ty)? {
                IndexStep::Element { stride, elem } => {
                    offset = scaled_offset(offset, index, stride)?;
                    ty = elem;
                }
                IndexStep::Field { fields } => {
                    let (field_offset, field_ty) = Self::field(fields, index)?;
                    offset = scaled_offset(offset, 1, field_offset)?;
                    ty = field_ty;
                }
            }
        }
        Ok((offset, ty.clone()))
    }
}

fn to_offset(cells: u64) -> CompileResult<i64> {
    i64::try_from(cells)
        .map_err(|_| CompileError::unsupported(format!("object of {cells} cells (too large)")))
}

/// `offset + index * stride`, rejecting results outside the address range.
pub fn scaled_offset(offset: i64, index: i64, stride: i64) -> CompileResult<i64> {
    index
        .checked_mul(stride)
        .and_then(|step| offset.checked_add(step))
        .ok_or_else(|| CompileError::unsupported(format!("address offset {offset} + {index} * {stride}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn i32_ty() -> Type {
        Type::Int(32)
    }

    #[test]
    fn test_scalar_layout() {
        assert_eq!(TypeLayout::layout(&i32_ty()).unwrap(), (1, &i32_ty()));
        assert_eq!(TypeLayout::cell_count(&i32_ty().ptr_to()).unwrap(), 1);
    }

    #[test]
    fn test_nested_array_layout() {
        let ty = Type::Array(2, Box::new(Type::Array(5, Box::new(i32_ty()))));
        let (cells, elem) = TypeLayout::layout(&ty).unwrap();
        assert_eq!(cells, 10);
        assert_eq!(elem, &i32_ty());
    }

    #[test]
    fn test_struct_fields_concatenate() {
        let fields = vec![i32_ty(), Type::Array(3, Box::new(i32_ty())), i32_ty().ptr_to()];
        let ty = Type::Struct(fields.clone());
        assert_eq!(TypeLayout::cell_count(&ty).unwrap(), 5);
        assert_eq!(TypeLayout::field_offset(&fields, 2).unwrap(), 4);
    }

    #[test]
    fn test_array_of_structs() {
        let pair = Type::Struct(vec![i32_ty(), i32_ty()]);
        let ty = Type::Array(4, Box::new(pair.clone()));
        let (cells, elem) = TypeLayout::layout(&ty).unwrap();
        assert_eq!(cells, 8);
        assert_eq!(elem, &pair);
    }

    #[test]
    fn test_constant_offset_two_dimensional() {
        let ty = Type::Array(4, Box::new(Type::Array(5, Box::new(i32_ty()))));
        let (offset, reached) = TypeLayout::constant_offset(&ty, &[0, 2, 3]).unwrap();
        assert_eq!(offset, 13);
        assert_eq!(reached, i32_ty());
    }

    #[test]
    fn test_constant_offset_into_struct_field() {
        let ty = Type::Struct(vec![
            i32_ty(),
            Type::Array(4, Box::new(i32_ty())),
            i32_ty(),
        ]);
        let (offset, reached) = TypeLayout::constant_offset(&ty, &[0, 2]).unwrap();
        assert_eq!(offset, 5);
        assert_eq!(reached, i32_ty());
        let (offset, _) = TypeLayout::constant_offset(&ty, &[0, 1, 2]).unwrap();
        assert_eq!(offset, 3);
    }

    #[test]
    fn test_leading_index_steps_whole_objects() {
        let ty = Type::Struct(vec![i32_ty(), i32_ty(), i32_ty()]);
        let (offset, _) = TypeLayout::constant_offset(&ty, &[2, 1]).unwrap();
        assert_eq!(offset, 7);
    }

    #[test]
    fn test_field_index_out_of_range() {
        let fields = vec![i32_ty()];
        assert!(TypeLayout::field(&fields, 1).is_err());
        assert!(TypeLayout::field(&fields, -1).is_err());
    }

    #[test]
    fn test_oversized_offsets_are_errors() {
        let big = Type::Array(1 << 40, Box::new(i32_ty()));
        assert_eq!(TypeLayout::stride(&big).unwrap(), 1 << 40);

        let saturated = Type::Array(u64::MAX, Box::new(big.clone()));
        assert_eq!(TypeLayout::cell_count(&saturated).unwrap(), u64::MAX);
        assert!(TypeLayout::stride(&saturated).is_err());

        let wide = Type::Array(1 << 62, Box::new(i32_ty()));
        assert!(TypeLayout::constant_offset(&wide, &[4]).is_err());
        assert!(TypeLayout::constant_offset(&wide, &[0, i64::MAX]).is_ok());
        assert!(TypeLayout::constant_offset(&big, &[1 << 20, 0]).is_ok());
    }

    #[test]
    fn test_void_has_no_layout() {
        assert!(TypeLayout::layout(&Type::Void).is_err());
    }
}
