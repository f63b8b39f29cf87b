//! What gets published: check out [`MessagePublication`].
mod publication;

pub use publication::MessagePublication;
