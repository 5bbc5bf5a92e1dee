//! Medical-lab catalog: categories, services and packages.

pub mod keys;
pub mod operations;
pub mod resource;
pub mod rows;
pub mod search;
pub mod types;
pub mod validation;

pub use keys::ResourceQueryKey;
pub use operations::{Listing, MutationState, ResourceOperations};
pub use resource::{CategoryResource, PackageResource, Resource, ResourceMessages, ServiceResource};
pub use search::{filter_by_name, filter_packages, filter_services, format_price, CatalogSummary};
pub use types::{Category, CategoryInput, CategoryRef, Package, PackageInput, Service, ServiceInput};

pub type CategoryOperations = ResourceOperations<CategoryResource>;
pub type ServiceOperations = ResourceOperations<ServiceResource>;
pub type PackageOperations = ResourceOperations<PackageResource>;
