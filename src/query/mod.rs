//! Grid query pipeline.
//!
//! A [`request::GridRequest`] is turned into a [`plan::QueryShape`] by the
//! [`builder::PredicateBuilder`], evaluated over one or more joined datasets by
//! [`join::JoinEngine`], windowed by [`pager::PagePlan`] and answered as a
//! [`response::GridResponse`]. [`executor::QueryExecutor`] ties the stages to the
//! result cache.

pub mod bounds;
pub mod builder;
pub mod executor;
pub mod join;
pub mod operators;
pub mod pager;
pub mod plan;
pub mod request;
pub mod response;

pub use bounds::{Bounds, BoundsMap};
pub use executor::{PreparedQuery, QueryExecutor};
pub use plan::{Combinator, Direction, Predicate, PredicateSet, QueryShape, SortSpec};
pub use request::{ColumnSearch, GridRequest, PageLength};
pub use response::{ColumnDescriptor, GridResponse};
