//! # Canonical Document Assembly
//!
//! Renders a [`Manifest`] into the canonical serialized document that
//! gets signed, with the access key embedded. The output is
//! deterministic: identical inputs produce byte-identical forms, because
//! the signature is computed over this exact byte sequence and the
//! authority re-derives the same form to verify it.
//!
//! Field names in the canonical layout follow the fiscal schema
//! (`cUF`, `dhEmi`, `UFIni`, `chNFe`, …) so a stored form reads like the
//! document the authority sees.

use mdfe_core::{AccessKey, CanonicalBytes, Cnpj, Timestamp, Uf};
use mdfe_core::error::CanonicalizationError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::Manifest;

/// Layout version of the canonical document.
pub const LAYOUT_VERSION: &str = "3.00";

/// Errors from assembly and summary extraction.
#[derive(Error, Debug)]
pub enum AssemblyError {
    /// Required domain fields are missing or empty. All violations are
    /// collected in one pass so the caller can fix them together.
    #[error("missing required fields: {}", fields.join(", "))]
    MissingFields {
        /// Names of the missing requirements.
        fields: Vec<&'static str>,
    },

    /// The access key disagrees with the manifest it is being embedded in.
    #[error("access key does not match manifest: {0}")]
    KeyMismatch(String),

    /// Canonical serialization failed.
    #[error("canonicalization error: {0}")]
    Canonicalization(#[from] CanonicalizationError),

    /// A stored canonical form could not be parsed back.
    #[error("malformed canonical form: {0}")]
    MalformedForm(String),
}

// ─── Canonical layout ────────────────────────────────────────────────

#[derive(Serialize, Deserialize)]
struct CanonicalDocument {
    #[serde(rename = "chMDFe")]
    key: String,
    versao: String,
    ide: Ide,
    emit: Emit,
    rodo: Rodo,
    #[serde(rename = "infDoc")]
    documents: Vec<InfDoc>,
    tot: Totals,
}

#[derive(Serialize, Deserialize)]
struct Ide {
    #[serde(rename = "cUF")]
    uf_code: u8,
    #[serde(rename = "mod")]
    model: String,
    serie: u16,
    #[serde(rename = "nMDF")]
    number: u32,
    #[serde(rename = "dhEmi")]
    emitted_at: String,
    #[serde(rename = "dhIniViagem")]
    journey_start: String,
    #[serde(rename = "UFIni")]
    origin: String,
    #[serde(rename = "UFFim")]
    destination: String,
}

#[derive(Serialize, Deserialize)]
struct Emit {
    #[serde(rename = "CNPJ")]
    cnpj: String,
    #[serde(rename = "xNome")]
    corporate_name: String,
}

#[derive(Serialize, Deserialize)]
struct Rodo {
    #[serde(rename = "veicTracao")]
    vehicle: VeicTracao,
    condutores: Vec<Condutor>,
}

#[derive(Serialize, Deserialize)]
struct VeicTracao {
    placa: String,
    #[serde(rename = "RENAVAM")]
    renavam: String,
    tara: u32,
    #[serde(rename = "capKG")]
    capacity_kg: u32,
}

#[derive(Serialize, Deserialize)]
struct Condutor {
    #[serde(rename = "xNome")]
    name: String,
    #[serde(rename = "CPF")]
    cpf: String,
}

#[derive(Serialize, Deserialize)]
struct InfDoc {
    #[serde(rename = "chNFe")]
    key: String,
    serie: u16,
    #[serde(rename = "nro")]
    number: u32,
    #[serde(rename = "vNF")]
    value_centavos: u64,
}

#[derive(Serialize, Deserialize)]
struct Totals {
    #[serde(rename = "qNFe")]
    document_count: usize,
    #[serde(rename = "vCarga")]
    value_centavos: u64,
    #[serde(rename = "cUnid")]
    unit: String,
    #[serde(rename = "qCarga")]
    quantity: u64,
}

// ─── Assembly ────────────────────────────────────────────────────────

/// Render a manifest into its canonical form with the access key
/// embedded.
///
/// `emitted_at` is the emission instant recorded in the document header;
/// it is an explicit input (not read from the clock) so that re-running
/// assembly over unchanged inputs reproduces the same bytes.
///
/// # Errors
///
/// - [`AssemblyError::MissingFields`] — required fields absent, all
///   reported together.
/// - [`AssemblyError::KeyMismatch`] — the key's model, issuer, or
///   emission period disagree with the manifest.
pub fn assemble(
    manifest: &Manifest,
    access_key: &AccessKey,
    emitted_at: Timestamp,
) -> Result<CanonicalBytes, AssemblyError> {
    let missing = missing_fields(manifest);
    if !missing.is_empty() {
        return Err(AssemblyError::MissingFields { fields: missing });
    }

    if access_key.model() != mdfe_core::MANIFEST_MODEL {
        return Err(AssemblyError::KeyMismatch(format!(
            "model {} is not a manifest key",
            access_key.model()
        )));
    }
    let key_issuer = access_key
        .issuer()
        .map_err(|e| AssemblyError::KeyMismatch(e.to_string()))?;
    if key_issuer != manifest.issuer.cnpj {
        return Err(AssemblyError::KeyMismatch(format!(
            "key issuer {} differs from manifest issuer {}",
            key_issuer, manifest.issuer.cnpj
        )));
    }
    let key_uf = access_key
        .uf()
        .map_err(|e| AssemblyError::KeyMismatch(e.to_string()))?;

    let document = CanonicalDocument {
        key: access_key.as_str().to_string(),
        versao: LAYOUT_VERSION.to_string(),
        ide: Ide {
            uf_code: key_uf.code(),
            model: mdfe_core::MANIFEST_MODEL.to_string(),
            serie: access_key.series(),
            number: access_key.number(),
            emitted_at: emitted_at.to_iso8601(),
            journey_start: manifest.journey_start.to_iso8601(),
            origin: manifest.route.origin.as_str().to_string(),
            destination: manifest.route.destination.as_str().to_string(),
        },
        emit: Emit {
            cnpj: manifest.issuer.cnpj.as_str().to_string(),
            corporate_name: manifest.issuer.corporate_name.clone(),
        },
        rodo: Rodo {
            vehicle: VeicTracao {
                placa: manifest.vehicle.plate.clone(),
                renavam: manifest.vehicle.renavam.clone(),
                tara: manifest.vehicle.tare_kg,
                capacity_kg: manifest.vehicle.capacity_kg,
            },
            condutores: manifest
                .drivers
                .iter()
                .map(|d| Condutor {
                    name: d.name.clone(),
                    cpf: d.cpf.as_str().to_string(),
                })
                .collect(),
        },
        documents: manifest
            .fiscal_documents
            .iter()
            .map(|d| InfDoc {
                key: d.key.as_str().to_string(),
                serie: d.series,
                number: d.number,
                value_centavos: d.value_centavos,
            })
            .collect(),
        tot: Totals {
            document_count: manifest.fiscal_documents.len(),
            value_centavos: manifest.cargo.total_value_centavos,
            unit: manifest.cargo.unit.code().to_string(),
            quantity: manifest.cargo.quantity,
        },
    };

    Ok(CanonicalBytes::new(&document)?)
}

/// Collect every missing requirement in one pass.
///
/// The typed fields (issuer id, route endpoints, driver CPFs, linked
/// keys) cannot be malformed by construction; what remains checkable is
/// presence and non-emptiness.
fn missing_fields(manifest: &Manifest) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if manifest.issuer.corporate_name.trim().is_empty() {
        missing.push("issuer corporate name");
    }
    if manifest.fiscal_documents.is_empty() {
        missing.push("at least one fiscal document");
    }
    if manifest.vehicle.plate.trim().is_empty() {
        missing.push("vehicle plate");
    }
    if manifest.vehicle.renavam.trim().is_empty() {
        missing.push("vehicle renavam");
    }
    if manifest.drivers.is_empty() {
        missing.push("at least one driver");
    }
    if manifest.cargo.total_value_centavos == 0 {
        missing.push("positive cargo value");
    }
    missing
}

// ─── Summary extraction ──────────────────────────────────────────────

/// Headline fields parsed back from a stored canonical form.
///
/// Used for display and audit without re-running full validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestSummary {
    /// The document's access key.
    pub access_key: AccessKey,
    /// Issuer tax id.
    pub issuer_cnpj: Cnpj,
    /// Issuer corporate name.
    pub issuer_name: String,
    /// Route origin.
    pub origin: Uf,
    /// Route destination.
    pub destination: Uf,
    /// Emission instant recorded in the document header.
    pub emitted_at: Timestamp,
    /// Total declared cargo value in centavos.
    pub total_value_centavos: u64,
    /// Number of consolidated fiscal documents.
    pub document_count: usize,
}

/// Parse the headline fields out of a canonical form.
///
/// # Errors
///
/// Returns [`AssemblyError::MalformedForm`] if the bytes do not parse as
/// a canonical document or embedded identifiers fail re-validation.
pub fn extract_summary(form: &CanonicalBytes) -> Result<ManifestSummary, AssemblyError> {
    let document: CanonicalDocument = serde_json::from_slice(form.as_bytes())
        .map_err(|e| AssemblyError::MalformedForm(e.to_string()))?;

    let access_key = AccessKey::parse(&document.key)
        .map_err(|e| AssemblyError::MalformedForm(format!("chMDFe: {e}")))?;
    let issuer_cnpj = Cnpj::new(&document.emit.cnpj)
        .map_err(|e| AssemblyError::MalformedForm(format!("emit.CNPJ: {e}")))?;
    let origin = Uf::parse(&document.ide.origin)
        .map_err(|e| AssemblyError::MalformedForm(format!("UFIni: {e}")))?;
    let destination = Uf::parse(&document.ide.destination)
        .map_err(|e| AssemblyError::MalformedForm(format!("UFFim: {e}")))?;
    let emitted_at = Timestamp::parse(&document.ide.emitted_at)
        .map_err(|e| AssemblyError::MalformedForm(format!("dhEmi: {e}")))?;

    Ok(ManifestSummary {
        access_key,
        issuer_cnpj,
        issuer_name: document.emit.corporate_name,
        origin,
        destination,
        emitted_at,
        total_value_centavos: document.tot.value_centavos,
        document_count: document.tot.document_count,
    })
}
