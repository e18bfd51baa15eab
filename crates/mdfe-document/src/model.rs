//! # Manifest Domain Model
//!
//! The domain payload a transport manifest is built from: who is
//! issuing, the route being driven, what cargo is aboard, which vehicle
//! and drivers carry it, and the fiscal documents it consolidates.
//!
//! Identifier-shaped fields use the validated newtypes from `mdfe-core`;
//! free-text and collection fields are checked at assembly time, where
//! every missing requirement is reported in one pass.

use mdfe_core::{AccessKey, Cnpj, Cpf, Timestamp, Uf};
use serde::{Deserialize, Serialize};

/// The issuing carrier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issuer {
    /// Issuer tax id.
    pub cnpj: Cnpj,
    /// Registered corporate name.
    pub corporate_name: String,
}

/// Route endpoints for the transport.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Route {
    /// State where the journey starts.
    pub origin: Uf,
    /// State where the journey ends.
    pub destination: Uf,
}

/// Unit for the cargo quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeightUnit {
    /// Kilograms (wire code 01).
    Kg,
    /// Metric tons (wire code 02).
    Ton,
}

impl WeightUnit {
    /// The two-digit wire code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Kg => "01",
            Self::Ton => "02",
        }
    }
}

/// Aggregate cargo figures.
///
/// Monetary values are integers in centavos and quantities are integers
/// in the declared unit — the canonical form rejects floats, so there is
/// no lossy conversion at the serialization boundary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CargoInfo {
    /// Total declared value of the cargo, in centavos.
    pub total_value_centavos: u64,
    /// Gross cargo quantity in `unit`.
    pub quantity: u64,
    /// Unit of `quantity`.
    pub unit: WeightUnit,
}

/// The conveyance: a road vehicle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vehicle {
    /// License plate (7 characters, letters and digits).
    pub plate: String,
    /// National vehicle registry number (RENAVAM).
    pub renavam: String,
    /// Tare weight in kilograms.
    pub tare_kg: u32,
    /// Load capacity in kilograms.
    pub capacity_kg: u32,
}

/// A driver assigned to the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    /// Full name.
    pub name: String,
    /// Driver's CPF.
    pub cpf: Cpf,
}

/// A fiscal document consolidated by this manifest (an NF-e).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkedDocument {
    /// The linked document's own 44-digit access key.
    pub key: AccessKey,
    /// Series of the linked document.
    pub series: u16,
    /// Number of the linked document.
    pub number: u32,
    /// Declared value in centavos.
    pub value_centavos: u64,
}

/// The complete manifest domain model as received from the caller.
///
/// Owned by the lifecycle engine once a document is created from it; no
/// other component mutates it afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// The issuing carrier.
    pub issuer: Issuer,
    /// Route endpoints.
    pub route: Route,
    /// When the journey starts.
    pub journey_start: Timestamp,
    /// Aggregate cargo figures.
    pub cargo: CargoInfo,
    /// The vehicle.
    pub vehicle: Vehicle,
    /// Assigned drivers — at least one is required at assembly.
    pub drivers: Vec<Driver>,
    /// Consolidated fiscal documents — at least one is required at
    /// assembly.
    pub fiscal_documents: Vec<LinkedDocument>,
}
