pub mod access;
pub mod domain;
pub mod entitlement;
pub mod ports;
pub mod role;
pub mod validation;

pub use access::{authorize, check_roles, rules, AccessError, Caller, ResourceState, Rule};
pub use domain::{
    Chapter, ChapterStatus, Language, MangaSeries, NewChapter, NewPage, NewSeries, NewUser, Page,
    ReadingMode, ReadingProgress, SeriesFilter, SeriesPage, SeriesStatus, SeriesUpdate, Tag,
    TagUsage, ThemeMode, User, UserCredentials, ViewerSettings,
};
pub use entitlement::{
    charge_upload, QuotaError, Subscription, SubscriptionPlan, SubscriptionStatus, UploadCharge,
};
pub use ports::{DatabaseService, PortError, PortResult};
pub use role::Role;
pub use validation::ValidationError;
