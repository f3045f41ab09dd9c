/// An owned NBT value. Compounds keep their children in insertion order, so
/// serialising is deterministic and tests can control child order exactly.
#[derive(Debug, Clone, PartialEq)]
pub enum Tag {
  End,
  Byte(i8),
  Short(i16),
  Int(i32),
  Long(i64),
  Float(f32),
  Double(f64),
  ByteArr(Vec<u8>),
  String(String),
  List(Vec<Tag>),
  Compound(Vec<(String, Tag)>),
  IntArray(Vec<i32>),
  LongArray(Vec<i64>),
}

/// A named root tag.
#[derive(Debug, Clone, PartialEq)]
pub struct Nbt {
  name: String,
  tag:  Tag,
}

impl Nbt {
  pub fn new(name: &str, tag: Tag) -> Self { Nbt { name: name.into(), tag } }

  pub fn serialize(&self) -> Vec<u8> {
    let mut out = vec![];
    self.serialize_buf(&mut out);
    out
  }

  pub fn serialize_buf(&self, out: &mut Vec<u8>) {
    out.push(self.tag.ty());
    if matches!(self.tag, Tag::End) {
      return;
    }
    out.extend((self.name.len() as u16).to_be_bytes());
    out.extend(self.name.as_bytes());
    self.tag.serialize(out);
  }
}

impl Tag {
  /// Builds a compound from named children, keeping the given order.
  pub fn compound(children: &[(&str, Tag)]) -> Self {
    Tag::Compound(children.iter().map(|(name, tag)| (name.to_string(), tag.clone())).collect())
  }

  /// Returns the type of the tag.
  pub fn ty(&self) -> u8 {
    match self {
      Self::End => 0,
      Self::Byte(_) => 1,
      Self::Short(_) => 2,
      Self::Int(_) => 3,
      Self::Long(_) => 4,
      Self::Float(_) => 5,
      Self::Double(_) => 6,
      Self::ByteArr(_) => 7,
      Self::String(_) => 8,
      Self::List(_) => 9,
      Self::Compound(_) => 10,
      Self::IntArray(_) => 11,
      Self::LongArray(_) => 12,
    }
  }

  /// Serializes the data of the tag. Does not add the type byte.
  fn serialize(&self, out: &mut Vec<u8>) {
    match self {
      Self::End => (),
      Self::Byte(v) => out.push(*v as u8),
      Self::Short(v) => out.extend(v.to_be_bytes()),
      Self::Int(v) => out.extend(v.to_be_bytes()),
      Self::Long(v) => out.extend(v.to_be_bytes()),
      Self::Float(v) => out.extend(v.to_be_bytes()),
      Self::Double(v) => out.extend(v.to_be_bytes()),
      Self::ByteArr(v) => {
        out.extend((v.len() as i32).to_be_bytes());
        out.extend_from_slice(v);
      }
      Self::String(v) => {
        out.extend((v.len() as u16).to_be_bytes());
        out.extend(v.as_bytes());
      }
      Self::List(v) => {
        out.push(v.first().unwrap_or(&Self::End).ty());
        out.extend((v.len() as i32).to_be_bytes());
        for tag in v {
          tag.serialize(out);
        }
      }
      Self::Compound(v) => {
        for (name, tag) in v {
          out.push(tag.ty());
          if tag.ty() == Self::End.ty() {
            // End tags don't have a name, so we stop early.
            break;
          }
          out.extend((name.len() as u16).to_be_bytes());
          out.extend(name.as_bytes());
          tag.serialize(out);
        }
        out.push(Self::End.ty());
      }
      Self::IntArray(v) => {
        out.extend((v.len() as i32).to_be_bytes());
        for elem in v {
          out.extend(elem.to_be_bytes());
        }
      }
      Self::LongArray(v) => {
        out.extend((v.len() as i32).to_be_bytes());
        for elem in v {
          out.extend(elem.to_be_bytes());
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::nbt::walk;
  use pretty_assertions::assert_eq;

  #[test]
  fn known_bytes() {
    let data = Nbt::new("hi", Tag::Short(0x0304)).serialize();
    assert_eq!(data, vec![2, 0, 2, b'h', b'i', 3, 4]);

    let data = Nbt::new("", Tag::compound(&[("a", Tag::Byte(1))])).serialize();
    assert_eq!(data, vec![10, 0, 0, 1, 0, 1, b'a', 1, 0]);
  }

  #[test]
  fn string_layout() {
    let data = Nbt::new("s", Tag::String("ab".into())).serialize();
    assert_eq!(data, vec![8, 0, 1, b's', 0, 2, b'a', b'b']);
  }

  #[test]
  fn walker_agrees() {
    // The walker and the writer must agree on the format: stepping over a
    // serialised tag lands at the end of the buffer, for every type.
    let tags = [
      Tag::Byte(1),
      Tag::Short(2),
      Tag::Int(3),
      Tag::Long(4),
      Tag::Float(5.0),
      Tag::Double(6.0),
      Tag::ByteArr(vec![7; 7]),
      Tag::String("eight".into()),
      Tag::List(vec![Tag::Int(9), Tag::Int(10)]),
      Tag::List(vec![]),
      Tag::compound(&[("k", Tag::String("v".into()))]),
      Tag::IntArray(vec![11, 12]),
      Tag::LongArray(vec![13]),
    ];
    for tag in tags {
      let data = Nbt::new("t", tag.clone()).serialize();
      assert_eq!(walk::step(&data, 0), Some(data.len()), "mismatch on {tag:?}");
    }
  }
}
