//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod discount;
pub mod event;
pub mod loyalty_point;
pub mod payment;
pub mod ticket;
pub mod user;

// Re-export specific types to avoid conflicts
pub use discount::{Column as DiscountColumn, Entity as Discount, Model as DiscountModel};
pub use event::{Column as EventColumn, Entity as Event, EventStatus, Model as EventModel};
pub use loyalty_point::{
    Column as LoyaltyPointColumn, Entity as LoyaltyPoint, Model as LoyaltyPointModel,
};
pub use payment::{Column as PaymentColumn, Entity as Payment, Model as PaymentModel};
pub use ticket::{Column as TicketColumn, Entity as Ticket, Model as TicketModel, TicketStatus};
pub use user::{Column as UserColumn, Entity as User, Model as UserModel, Role};
