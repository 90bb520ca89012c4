// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod filter;
pub mod grouping;
pub mod ids;
pub mod model;
pub mod mutations;
pub mod pagination;
pub mod query;
pub mod sort;
pub mod state;
pub mod users;
pub mod view;

pub use filter::*;
pub use grouping::*;
pub use ids::*;
pub use model::*;
pub use mutations::*;
pub use pagination::*;
pub use query::*;
pub use sort::*;
pub use state::*;
pub use users::*;
pub use view::*;
