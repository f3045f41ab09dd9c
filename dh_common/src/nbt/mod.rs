//! NBT, in two halves.
//!
//! [`walk`] operates directly on serialised NBT bytes and never builds an
//! intermediate tree, which is what every hot path here wants. The nuances of
//! the format are not abstracted away, so make sure you're aware of how NBT
//! works before reaching for it.
//!
//! [`Tag`] is the opposite: an owned tree with a serialiser. It exists for
//! producing NBT (fixtures, mostly), not for parsing worlds.

pub mod walk;

mod serialize;

pub use serialize::{Nbt, Tag};
