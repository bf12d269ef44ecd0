// Permission checking backed by configuration.

pub mod static_permissions;

pub use static_permissions::StaticPermissions;
