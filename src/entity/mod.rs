//! Entity Model (spec.md §4.2): Resources, Revisions, Root Resources,
//! Resource Groups, Aliases, Project Properties, and the URL normalization
//! pipeline they all sit on top of.

pub mod model;
pub mod normalize;
pub mod pattern;
pub mod resource;
