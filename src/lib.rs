//! Drawing-annotation mode controller for paginated documents.
//!
//! The crate keeps a live, spatially indexed set of free-form drawing
//! annotations ("threads") on top of a host document viewer. The host feeds
//! pointer events and toolbar commands into a
//! [`controller::DrawingModeController`] and applies the
//! [`controller::Action`]s it returns. Page geometry comes from a
//! [`input::LocationResolver`] and persistence goes through an
//! [`service::AnnotationService`].
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`controller`] | Mode lifecycle, input routing, hit-testing and selection |
//! | [`thread`] | Drawing thread state machine, strokes and lifecycle events |
//! | [`index`] | R-tree spatial index over thread bounding boxes |
//! | [`router`] | Per-source publish/subscribe queue for thread events |
//! | [`input`] | Pointer events, commands, mode bindings and page layout |
//! | [`service`] | Persistence seam, tokio channel adapter and loopback backend |
//! | [`geom`] | Points, locations and bounding boxes |
//! | [`config`] | Environment-driven controller configuration |
//! | [`replay`] | JSON session scripts for the `drawmode` binary |
//! | [`consts`] | Shared numeric constants (border offset, node capacity, page defaults) |

pub mod config;
pub mod consts;
pub mod controller;
pub mod geom;
pub mod index;
pub mod input;
pub mod replay;
pub mod router;
pub mod service;
pub mod thread;
