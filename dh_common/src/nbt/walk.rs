//! Zero-copy navigation over serialised NBT.
//!
//! Positions are byte offsets into the chunk buffer. A `tag` offset points at
//! a tag's type byte; a `payload` offset points just past the type and name.
//! Every function validates against the end of the buffer and returns `None`
//! when the data would overrun it, which callers surface as malformed input.

use crate::util::be;

pub const END: u8 = 0;
pub const BYTE: u8 = 1;
pub const SHORT: u8 = 2;
pub const INT: u8 = 3;
pub const LONG: u8 = 4;
pub const FLOAT: u8 = 5;
pub const DOUBLE: u8 = 6;
pub const BYTE_ARRAY: u8 = 7;
pub const STRING: u8 = 8;
pub const LIST: u8 = 9;
pub const COMPOUND: u8 = 10;
pub const INT_ARRAY: u8 = 11;
pub const LONG_ARRAY: u8 = 12;

pub fn is_valid(ty: u8) -> bool { ty <= LONG_ARRAY }
pub fn is_integer(ty: u8) -> bool { matches!(ty, BYTE | SHORT | INT | LONG) }
pub fn is_number(ty: u8) -> bool { is_integer(ty) || ty == FLOAT || ty == DOUBLE }

/// The type of the tag at `tag`.
pub fn ty(data: &[u8], tag: usize) -> Option<u8> { be::u8(data, tag) }

/// The size of the tag's name.
pub fn name_size(data: &[u8], tag: usize) -> Option<u16> { be::u16(data, tag + 1) }

/// The tag's name bytes. Not null terminated, not guaranteed to be UTF-8.
pub fn name(data: &[u8], tag: usize) -> Option<&[u8]> {
  let size = name_size(data, tag)? as usize;
  data.get(tag + 3..tag + 3 + size)
}

// How many bytes a payload of this type starts with (fixed part only).
fn payload_head(ty: u8) -> usize {
  match ty {
    BYTE => 1,
    SHORT => 2,
    INT => 4,
    LONG => 8,
    FLOAT => 4,
    DOUBLE => 8,
    BYTE_ARRAY => 4,
    STRING => 2,
    LIST => 5,
    COMPOUND => 1,
    INT_ARRAY => 4,
    LONG_ARRAY => 4,
    _ => 0,
  }
}

/// Returns the payload offset of the tag at `tag`, if the tag is of type
/// `want` and its payload head is in bounds.
pub fn payload(data: &[u8], tag: usize, want: u8) -> Option<usize> {
  if ty(data, tag)? != want {
    return None;
  }
  let p = tag + 3 + name_size(data, tag)? as usize;
  if !be::has(data, p, payload_head(want)) {
    return None;
  }
  Some(p)
}

/// Returns the offset just past the whole tag at `tag`. For valid NBT that is
/// either the next tag or the end of the buffer.
pub fn step(data: &[u8], tag: usize) -> Option<usize> {
  let ty = be::u8(data, tag)?;
  if !is_valid(ty) {
    return None;
  }
  if ty == END {
    return Some(tag + 1);
  }
  let name_size = name_size(data, tag)? as usize;
  if !be::has(data, tag + 3, name_size) {
    return None;
  }
  payload_step(data, tag + 3 + name_size, ty)
}

/// Returns the offset just past a payload of the stated type.
pub fn payload_step(data: &[u8], payload: usize, ty: u8) -> Option<usize> {
  match ty {
    BYTE => skip(data, payload, 1),
    SHORT => skip(data, payload, 2),
    INT => skip(data, payload, 4),
    LONG => skip(data, payload, 8),
    FLOAT => skip(data, payload, 4),
    DOUBLE => skip(data, payload, 8),
    BYTE_ARRAY => {
      let size = usize::try_from(be::i32(data, payload)?).ok()?;
      skip(data, payload + 4, size)
    }
    STRING => {
      let size = be::u16(data, payload)? as usize;
      skip(data, payload + 2, size)
    }
    LIST => {
      let etype = list_etype(data, payload)?;
      let size = usize::try_from(list_size(data, payload)?).ok()?;
      let mut at = list_payload(payload);
      match etype {
        END => be::has(data, at, 0).then_some(at),
        BYTE => skip(data, at, size),
        SHORT => skip(data, at, size * 2),
        INT | FLOAT => skip(data, at, size * 4),
        LONG | DOUBLE => skip(data, at, size * 8),
        BYTE_ARRAY | STRING | LIST | COMPOUND | INT_ARRAY | LONG_ARRAY => {
          for _ in 0..size {
            at = payload_step(data, at, etype)?;
          }
          Some(at)
        }
        _ => None,
      }
    }
    COMPOUND => {
      let mut at = payload;
      while be::u8(data, at)? != END {
        at = step(data, at)?;
      }
      Some(at + 1)
    }
    INT_ARRAY => {
      let size = usize::try_from(be::i32(data, payload)?).ok()?;
      skip(data, payload + 4, size * 4)
    }
    LONG_ARRAY => {
      let size = usize::try_from(be::i32(data, payload)?).ok()?;
      skip(data, payload + 4, size * 8)
    }
    _ => None,
  }
}

fn skip(data: &[u8], at: usize, n: usize) -> Option<usize> {
  be::has(data, at, n).then_some(at + n)
}

pub fn byte(data: &[u8], payload: usize) -> Option<i8> { be::i8(data, payload) }
pub fn short(data: &[u8], payload: usize) -> Option<i16> { be::i16(data, payload) }
pub fn int(data: &[u8], payload: usize) -> Option<i32> { be::i32(data, payload) }
pub fn long(data: &[u8], payload: usize) -> Option<i64> { be::i64(data, payload) }
pub fn float(data: &[u8], payload: usize) -> Option<f32> { be::f32(data, payload) }
pub fn double(data: &[u8], payload: usize) -> Option<f64> { be::f64(data, payload) }

/// The bytes of a string payload.
pub fn string(data: &[u8], payload: usize) -> Option<&[u8]> {
  let size = be::u16(data, payload)? as usize;
  data.get(payload + 2..payload + 2 + size)
}

/// The bytes of a byte array payload.
pub fn byte_array(data: &[u8], payload: usize) -> Option<&[u8]> {
  let size = usize::try_from(be::i32(data, payload)?).ok()?;
  data.get(payload + 4..payload + 4 + size)
}

pub fn byte_array_size(data: &[u8], payload: usize) -> Option<i32> { be::i32(data, payload) }

pub fn list_etype(data: &[u8], payload: usize) -> Option<u8> { be::u8(data, payload) }
pub fn list_size(data: &[u8], payload: usize) -> Option<i32> { be::i32(data, payload + 1) }
/// Offset of the first list element.
pub fn list_payload(payload: usize) -> usize { payload + 5 }

pub fn int_array_size(data: &[u8], payload: usize) -> Option<i32> { be::i32(data, payload) }
pub fn long_array_size(data: &[u8], payload: usize) -> Option<i32> { be::i32(data, payload) }
/// Offset of the packed longs in a long array payload.
pub fn long_array_payload(payload: usize) -> usize { payload + 4 }

/// An out-slot for [`find_named`]. Slots are written when a child tag with
/// the matching name and an acceptable type is seen; otherwise untouched.
pub enum Slot<'out> {
  /// Requires the exact tag type; receives the payload offset.
  Payload(u8, &'out mut Option<usize>),
  /// Accepts any integer tag, widened to i64.
  Int(&'out mut Option<i64>),
  /// Accepts any number tag, widened to f64.
  Num(&'out mut Option<f64>),
}

/// Matches several named children of one compound payload in a single pass.
///
/// Section and palette parsing needs six to eight children per compound, and
/// walking the compound once per name doubles up the traversal cost, so the
/// whole schema is matched in one walk.
///
/// Returns the offset just past the compound's END tag, or `None` if the
/// compound is malformed.
pub fn find_named(data: &[u8], payload: usize, schema: &mut [(&str, Slot)]) -> Option<usize> {
  let mut at = payload;
  loop {
    let tag_ty = be::u8(data, at)?;
    if tag_ty == END {
      return Some(at + 1);
    }
    if !is_valid(tag_ty) {
      return None;
    }

    let name_size = be::u16(data, at + 1)? as usize;
    let tag_name = data.get(at + 3..at + 3 + name_size)?;
    let pay = at + 3 + name_size;

    for (name, slot) in schema.iter_mut() {
      if name.as_bytes() != tag_name {
        continue;
      }
      match slot {
        Slot::Payload(want, out) => {
          if *want == tag_ty && be::has(data, pay, payload_head(tag_ty)) {
            **out = Some(pay);
          }
        }
        Slot::Int(out) => {
          if is_integer(tag_ty) {
            **out = Some(read_integer(data, pay, tag_ty)?);
          }
        }
        Slot::Num(out) => {
          if is_number(tag_ty) {
            **out = Some(read_number(data, pay, tag_ty)?);
          }
        }
      }
    }

    at = payload_step(data, pay, tag_ty)?;
  }
}

fn read_integer(data: &[u8], payload: usize, ty: u8) -> Option<i64> {
  match ty {
    BYTE => byte(data, payload).map(i64::from),
    SHORT => short(data, payload).map(i64::from),
    INT => int(data, payload).map(i64::from),
    LONG => long(data, payload),
    _ => None,
  }
}

fn read_number(data: &[u8], payload: usize, ty: u8) -> Option<f64> {
  match ty {
    BYTE => byte(data, payload).map(f64::from),
    SHORT => short(data, payload).map(f64::from),
    INT => int(data, payload).map(f64::from),
    LONG => long(data, payload).map(|v| v as f64),
    FLOAT => float(data, payload).map(f64::from),
    DOUBLE => double(data, payload),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::nbt::{Nbt, Tag};
  use pretty_assertions::assert_eq;

  fn fixture() -> Vec<u8> {
    Nbt::new(
      "root",
      Tag::compound(&[
        ("small", Tag::Byte(5)),
        ("short", Tag::Short(-7)),
        ("int", Tag::Int(1234)),
        ("long", Tag::Long(123456789012)),
        ("float", Tag::Float(0.5)),
        ("double", Tag::Double(-2.25)),
        ("bytes", Tag::ByteArr(vec![1, 2, 3, 4])),
        ("name", Tag::String("minecraft:stone".into())),
        (
          "list",
          Tag::List(vec![
            Tag::String("one".into()),
            Tag::String("two".into()),
            Tag::String("three".into()),
          ]),
        ),
        ("nested", Tag::compound(&[("inner", Tag::Int(9))])),
        ("ints", Tag::IntArray(vec![3, 2, 1])),
        ("longs", Tag::LongArray(vec![0x0102030405060708, -1])),
      ]),
    )
    .serialize()
  }

  #[test]
  fn step_covers_every_type() {
    let data = fixture();
    // Stepping over the root compound tag covers every payload shape and must
    // land exactly on the end of the buffer.
    assert_eq!(step(&data, 0), Some(data.len()));
  }

  #[test]
  fn step_rejects_truncation() {
    let data = fixture();
    // Chopping the buffer anywhere must fail the walk rather than overrun.
    for len in 0..data.len() - 1 {
      assert_eq!(step(&data[..len], 0), None, "failed at {len}");
    }
  }

  #[test]
  fn walks_into_children() {
    let data = fixture();
    let root = payload(&data, 0, COMPOUND).unwrap();

    let mut name_p = None;
    let mut list_p = None;
    let end = find_named(
      &data,
      root,
      &mut [("name", Slot::Payload(STRING, &mut name_p)), ("list", Slot::Payload(LIST, &mut list_p))],
    )
    .unwrap();
    assert_eq!(end, data.len());

    assert_eq!(string(&data, name_p.unwrap()).unwrap(), b"minecraft:stone");

    let list_p = list_p.unwrap();
    assert_eq!(list_etype(&data, list_p), Some(STRING));
    assert_eq!(list_size(&data, list_p), Some(3));
    let mut at = list_payload(list_p);
    let mut items = vec![];
    for _ in 0..3 {
      items.push(string(&data, at).unwrap().to_vec());
      at = payload_step(&data, at, STRING).unwrap();
    }
    assert_eq!(items, vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]);
  }

  #[test]
  fn find_named_coerces_integers() {
    let data = fixture();
    let root = payload(&data, 0, COMPOUND).unwrap();

    let mut small = None;
    let mut long_v = None;
    let mut float_v = None;
    let mut missing = None;
    let mut wrong_type = None;
    find_named(
      &data,
      root,
      &mut [
        ("small", Slot::Int(&mut small)),
        ("long", Slot::Int(&mut long_v)),
        ("float", Slot::Num(&mut float_v)),
        ("nope", Slot::Int(&mut missing)),
        // A string is not an integer; the slot stays untouched.
        ("name", Slot::Int(&mut wrong_type)),
      ],
    )
    .unwrap();

    assert_eq!(small, Some(5));
    assert_eq!(long_v, Some(123456789012));
    assert_eq!(float_v, Some(0.5));
    assert_eq!(missing, None);
    assert_eq!(wrong_type, None);
  }

  #[test]
  fn payload_checks_type() {
    let data = fixture();
    assert!(payload(&data, 0, COMPOUND).is_some());
    assert_eq!(payload(&data, 0, LIST), None);
  }

  #[test]
  fn empty_compound() {
    let data = Nbt::new("e", Tag::compound(&[])).serialize();
    let root = payload(&data, 0, COMPOUND).unwrap();
    assert_eq!(find_named(&data, root, &mut []), Some(data.len()));
  }
}
