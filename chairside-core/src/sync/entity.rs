// SPDX-FileCopyrightText: 2026 Chairside Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Entity Routing
//!
//! Closed set of syncable entity kinds. Remote changes carry a dotted
//! `entity_type` path (e.g. `clinic.records.patient`); the leaf segment
//! selects the kind, which in turn selects the local table.

use serde::{Deserialize, Serialize};

/// The syncable domain entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Patient,
    Appointment,
    Treatment,
    Invoice,
}

impl EntityKind {
    /// All kinds, in schema order.
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Patient,
        EntityKind::Appointment,
        EntityKind::Treatment,
        EntityKind::Invoice,
    ];

    /// Resolves a kind from a dotted entity-type path.
    ///
    /// The leaf segment is the key: `clinic.records.patient` and `patient`
    /// both resolve to [`EntityKind::Patient`]. Unknown leaves return `None`
    /// so callers can skip changes for entity types this client does not
    /// materialize.
    pub fn from_entity_type(entity_type: &str) -> Option<Self> {
        let leaf = entity_type.rsplit('.').next().unwrap_or(entity_type);
        match leaf {
            "patient" | "patients" => Some(EntityKind::Patient),
            "appointment" | "appointments" => Some(EntityKind::Appointment),
            "treatment" | "treatments" => Some(EntityKind::Treatment),
            "invoice" | "invoices" => Some(EntityKind::Invoice),
            _ => None,
        }
    }

    /// Local table holding records of this kind.
    pub fn table_name(&self) -> &'static str {
        match self {
            EntityKind::Patient => "patients",
            EntityKind::Appointment => "appointments",
            EntityKind::Treatment => "treatments",
            EntityKind::Invoice => "invoices",
        }
    }

    /// Canonical leaf name used in entity-type paths and channel addresses.
    pub fn leaf_name(&self) -> &'static str {
        match self {
            EntityKind::Patient => "patient",
            EntityKind::Appointment => "appointment",
            EntityKind::Treatment => "treatment",
            EntityKind::Invoice => "invoice",
        }
    }

    /// Whether records of this kind carry a `patientId` foreign key that
    /// the store indexes for lookups.
    pub fn has_patient_fk(&self) -> bool {
        !matches!(self, EntityKind::Patient)
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.leaf_name())
    }
}
