//! Bridge core: pairing registry, message broker, delivery translation and
//! identity mapping.

pub mod broker;
pub mod mapper;
pub mod registry;
pub mod translator;

pub use broker::{MessageBroker, Subscription};
pub use mapper::{DeliveryRecord, IdentityMapper, MappingKey};
pub use registry::PairingRegistry;
pub use translator::{DeliveryTranslator, PlatformOp, PresentationProfile};
