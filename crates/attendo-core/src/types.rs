// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for Attendo: participants, badge content, label layout.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered event participant.
///
/// The `uuid` is what the participant's QR code encodes; `employee_id` is the
/// human-facing identifier printed on the badge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub uuid: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub employee_id: String,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub attended_at: Option<DateTime<Utc>>,
}

impl Participant {
    pub fn new(first_name: &str, last_name: &str, employee_id: &str) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            employee_id: employee_id.into(),
            department: None,
            attended_at: None,
        }
    }

    pub fn with_department(mut self, department: &str) -> Self {
        self.department = Some(department.into());
        self
    }

    /// Name as printed on the badge ("First Last").
    pub fn display_name(&self) -> String {
        match (self.first_name.trim(), self.last_name.trim()) {
            ("", last) => last.to_string(),
            (first, "") => first.to_string(),
            (first, last) => format!("{first} {last}"),
        }
    }

    pub fn has_attended(&self) -> bool {
        self.attended_at.is_some()
    }

    /// Badge content for this participant. The QR payload is the participant
    /// UUID so a printed badge can be scanned again at the door.
    pub fn badge(&self) -> BadgeContent {
        BadgeContent {
            name: self.display_name(),
            identifier: self.employee_id.clone(),
            department: self.department.clone(),
            qr_payload: Some(self.uuid.to_string()),
        }
    }
}

/// The text a single badge carries. Exists only for one print.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeContent {
    pub name: String,
    pub identifier: String,
    pub department: Option<String>,
    pub qr_payload: Option<String>,
}

/// Kind of a drawable badge element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementKind {
    Name,
    Identifier,
    Department,
    QrCode,
}

/// One drawable element of a badge, in print order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadgeElement {
    pub kind: ElementKind,
    pub value: String,
}

impl BadgeContent {
    /// Elements in the fixed draw order: name, identifier, department, QR.
    ///
    /// Empty department and QR values are omitted. Name and identifier are
    /// always drawn, even when blank, so a label never prints without its
    /// identity fields being attempted.
    pub fn elements(&self) -> Vec<BadgeElement> {
        let mut elements = vec![
            BadgeElement {
                kind: ElementKind::Name,
                value: self.name.clone(),
            },
            BadgeElement {
                kind: ElementKind::Identifier,
                value: self.identifier.clone(),
            },
        ];
        if let Some(dept) = self.department.as_deref().filter(|d| !d.trim().is_empty()) {
            elements.push(BadgeElement {
                kind: ElementKind::Department,
                value: dept.to_string(),
            });
        }
        if let Some(qr) = self.qr_payload.as_deref().filter(|q| !q.trim().is_empty()) {
            elements.push(BadgeElement {
                kind: ElementKind::QrCode,
                value: qr.to_string(),
            });
        }
        elements
    }
}

/// Horizontal text alignment inside a text box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

impl TextAlign {
    /// Numeric value the daemon expects.
    pub fn daemon_value(&self) -> u8 {
        match self {
            Self::Left => 0,
            Self::Center => 1,
            Self::Right => 2,
        }
    }
}

/// Position and styling of one text element, in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TextBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub font_size: f64,
    pub align: TextAlign,
    #[serde(default)]
    pub letter_spacing: f64,
    #[serde(default = "default_line_spacing")]
    pub line_spacing: f64,
    #[serde(default)]
    pub bold: bool,
}

fn default_line_spacing() -> f64 {
    1.0
}

/// Position of the QR code element, in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QrBox {
    pub x: f64,
    pub y: f64,
    pub size: f64,
}

/// Physical layout of a badge label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelLayout {
    pub width_mm: f64,
    pub height_mm: f64,
    /// Board rotation in degrees (0, 90, 180, 270).
    pub rotation: u16,
    pub name: TextBox,
    pub identifier: TextBox,
    pub department: TextBox,
    pub qr: Option<QrBox>,
}

impl Default for LabelLayout {
    fn default() -> Self {
        Self {
            width_mm: 50.0,
            height_mm: 30.0,
            rotation: 0,
            name: TextBox {
                x: 2.0,
                y: 2.5,
                width: 46.0,
                height: 8.0,
                font_size: 5.6,
                align: TextAlign::Center,
                letter_spacing: 0.0,
                line_spacing: 1.0,
                bold: true,
            },
            identifier: TextBox {
                x: 2.0,
                y: 13.0,
                width: 30.0,
                height: 5.0,
                font_size: 3.2,
                align: TextAlign::Left,
                letter_spacing: 0.0,
                line_spacing: 1.0,
                bold: false,
            },
            department: TextBox {
                x: 2.0,
                y: 19.5,
                width: 30.0,
                height: 5.0,
                font_size: 3.2,
                align: TextAlign::Left,
                letter_spacing: 0.0,
                line_spacing: 1.0,
                bold: false,
            },
            qr: Some(QrBox {
                x: 34.0,
                y: 12.0,
                size: 14.0,
            }),
        }
    }
}

impl LabelLayout {
    /// Text box for a text element kind. QR codes have no text box.
    pub fn text_box(&self, kind: ElementKind) -> Option<&TextBox> {
        match kind {
            ElementKind::Name => Some(&self.name),
            ElementKind::Identifier => Some(&self.identifier),
            ElementKind::Department => Some(&self.department),
            ElementKind::QrCode => None,
        }
    }
}

/// Job-level print settings sent with `startJob`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintSettings {
    /// Print darkness, 1-5 on most thermal label printers.
    pub density: u8,
    /// 1 = gap paper, 2 = black mark, 3 = continuous.
    pub label_type: u8,
    /// 1 = thermal, 2 = thermal transfer.
    pub mode: u8,
    pub copies: u32,
}

impl Default for PrintSettings {
    fn default() -> Self {
        Self {
            density: 3,
            label_type: 1,
            mode: 1,
            copies: 1,
        }
    }
}

/// A printer the daemon reports as attached.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrinterDevice {
    pub name: String,
    pub port: i64,
}

/// Result of a completed badge print.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrintOutcome {
    pub copies: u32,
    pub pages: u32,
    pub elapsed: Duration,
}
