// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Wire protocol of the local label-printer daemon.
//
// Every frame is a JSON text message.
//
// Outgoing:  { "apiName": <string>, "parameter"?: <object> }
// Incoming:  { "apiName": <string>, "resultAck": { "errorCode": <int>, "info": ... } }
//
// `errorCode == 0` is success. `info` is either a JSON-encoded payload (the
// device list) or a status string. Messages named `PUSH_API_NAME` are
// unsolicited device/job events and never answer a request.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use attendo_core::error::Result;
use attendo_core::types::{LabelLayout, PrintSettings, PrinterDevice, QrBox, TextBox};

/// Operation name reserved for unsolicited device and job events.
pub const PUSH_API_NAME: &str = "printStatus";

/// Synthetic code: the socket was not open when the request was sent.
pub const ERROR_NOT_CONNECTED: i64 = -1;
/// Synthetic code: no response arrived within the request window.
pub const ERROR_TIMEOUT: i64 = -2;
/// Synthetic code: a newer request with the same operation name took over the
/// pending slot before a response arrived.
pub const ERROR_SUPERSEDED: i64 = -3;
/// Synthetic code: the request could not be encoded and was never sent.
pub const ERROR_INVALID_REQUEST: i64 = -4;

/// `codeType` value for QR symbols.
const SYMBOL_QR: u32 = 31;

/// Daemon operations used by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ApiName {
    InitSdk,
    GetAllPrinters,
    SelectPrinter,
    InitDrawingBoard,
    DrawText,
    DrawQrCode,
    StartJob,
    CommitJob,
    EndJob,
}

impl ApiName {
    pub const ALL: [ApiName; 9] = [
        ApiName::InitSdk,
        ApiName::GetAllPrinters,
        ApiName::SelectPrinter,
        ApiName::InitDrawingBoard,
        ApiName::DrawText,
        ApiName::DrawQrCode,
        ApiName::StartJob,
        ApiName::CommitJob,
        ApiName::EndJob,
    ];

    /// The `apiName` string on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InitSdk => "initSdk",
            Self::GetAllPrinters => "getAllPrinters",
            Self::SelectPrinter => "selectPrinter",
            Self::InitDrawingBoard => "InitDrawingBoard",
            Self::DrawText => "DrawLableText",
            Self::DrawQrCode => "DrawLableQrCode",
            Self::StartJob => "startJob",
            Self::CommitJob => "commitJob",
            Self::EndJob => "endJob",
        }
    }
}

impl fmt::Display for ApiName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiName {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ApiName::ALL
            .iter()
            .copied()
            .find(|api| api.as_str() == s)
            .ok_or_else(|| format!("unknown daemon operation: {s}"))
    }
}

/// A request frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    /// Operation name; also the correlation key for the response.
    pub api_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter: Option<Value>,
}

impl Request {
    pub fn new(api: ApiName) -> Self {
        Self {
            api_name: api.as_str().to_string(),
            parameter: None,
        }
    }

    pub fn with_parameter(mut self, parameter: &impl Serialize) -> Result<Self> {
        self.parameter = Some(serde_json::to_value(parameter)?);
        Ok(self)
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn init_sdk(font_dir: &str) -> Result<Self> {
        Self::new(ApiName::InitSdk).with_parameter(&InitSdkParams {
            font_dir: font_dir.to_string(),
        })
    }

    pub fn get_all_printers() -> Self {
        Self::new(ApiName::GetAllPrinters)
    }

    pub fn select_printer(name: &str, port: i64) -> Result<Self> {
        Self::new(ApiName::SelectPrinter).with_parameter(&SelectPrinterParams {
            printer_name: name.to_string(),
            port,
        })
    }

    pub fn init_drawing_board(layout: &LabelLayout, font_file: &str) -> Result<Self> {
        Self::new(ApiName::InitDrawingBoard).with_parameter(&DrawingBoardParams {
            width: layout.width_mm,
            height: layout.height_mm,
            rotate: layout.rotation,
            path: font_file.to_string(),
            vertical_shift: 0,
            horizontal_shift: 0,
        })
    }

    pub fn draw_text(text_box: &TextBox, value: &str, font_file: &str) -> Result<Self> {
        Self::new(ApiName::DrawText).with_parameter(&TextParams {
            x: text_box.x,
            y: text_box.y,
            width: text_box.width,
            height: text_box.height,
            value: value.to_string(),
            font_family: font_file.to_string(),
            rotate: 0,
            font_size: text_box.font_size,
            text_align_horizontal: text_box.align.daemon_value(),
            text_align_vertical: 1,
            letter_spacing: text_box.letter_spacing,
            line_spacing: text_box.line_spacing,
            line_mode: 6,
            font_style: [text_box.bold, false, false, false],
        })
    }

    pub fn draw_qr_code(qr: &QrBox, value: &str) -> Result<Self> {
        Self::new(ApiName::DrawQrCode).with_parameter(&QrParams {
            x: qr.x,
            y: qr.y,
            width: qr.size,
            height: qr.size,
            value: value.to_string(),
            code_type: SYMBOL_QR,
            rotate: 0,
        })
    }

    pub fn start_job(settings: &PrintSettings) -> Result<Self> {
        Self::new(ApiName::StartJob).with_parameter(&StartJobParams {
            print_density: settings.density,
            print_label_type: settings.label_type,
            print_mode: settings.mode,
            count: settings.copies,
        })
    }

    /// The daemon expects a null image slot and the copy count as a
    /// JSON-encoded string.
    pub fn commit_job(copies: u32) -> Result<Self> {
        let processing = serde_json::to_string(&serde_json::json!({ "printQuantity": copies }))?;
        Self::new(ApiName::CommitJob).with_parameter(&CommitJobParams {
            print_data: None,
            printer_image_processing_info: processing,
        })
    }

    pub fn end_job() -> Self {
        Self::new(ApiName::EndJob)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InitSdkParams {
    font_dir: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SelectPrinterParams {
    printer_name: String,
    port: i64,
}

#[derive(Serialize)]
struct DrawingBoardParams {
    width: f64,
    height: f64,
    rotate: u16,
    path: String,
    #[serde(rename = "verticalShift")]
    vertical_shift: i32,
    #[serde(rename = "HorizontalShift")]
    horizontal_shift: i32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TextParams {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    value: String,
    font_family: String,
    rotate: u16,
    font_size: f64,
    // The daemon spells this key "Horizonral".
    #[serde(rename = "textAlignHorizonral")]
    text_align_horizontal: u8,
    text_align_vertical: u8,
    letter_spacing: f64,
    line_spacing: f64,
    line_mode: u8,
    font_style: [bool; 4],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QrParams {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    value: String,
    code_type: u32,
    rotate: u16,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StartJobParams {
    print_density: u8,
    print_label_type: u8,
    print_mode: u8,
    count: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CommitJobParams {
    print_data: Option<String>,
    printer_image_processing_info: String,
}

/// Result block of a response or push.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultAck {
    #[serde(default)]
    pub error_code: i64,
    #[serde(default)]
    pub info: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub print_copies: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub print_pages: Option<u32>,
}

impl ResultAck {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn error(code: i64, info: &str) -> Self {
        Self {
            error_code: code,
            info: Value::String(info.to_string()),
            ..Self::default()
        }
    }

    pub fn not_connected() -> Self {
        Self::error(ERROR_NOT_CONNECTED, "not connected to the print daemon")
    }

    pub fn timeout(api_name: &str, after: Duration) -> Self {
        Self::error(
            ERROR_TIMEOUT,
            &format!("{api_name} timed out after {}ms", after.as_millis()),
        )
    }

    pub fn superseded(api_name: &str) -> Self {
        Self::error(
            ERROR_SUPERSEDED,
            &format!("{api_name} was superseded by a newer request"),
        )
    }

    pub fn invalid_request(api_name: &str, reason: &str) -> Self {
        Self::error(
            ERROR_INVALID_REQUEST,
            &format!("{api_name} request could not be encoded: {reason}"),
        )
    }

    pub fn is_success(&self) -> bool {
        self.error_code == 0
    }

    /// `info` as display text: strings verbatim, other values as JSON.
    pub fn info_text(&self) -> String {
        match &self.info {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// `info` as structured JSON. String payloads are decoded once more,
    /// since the daemon double-encodes them.
    pub fn info_json(&self) -> Option<Value> {
        match &self.info {
            Value::Null => None,
            Value::String(s) => serde_json::from_str(s).ok(),
            other => Some(other.clone()),
        }
    }

    /// Copies and pages printed so far, from the ack fields or from the
    /// `info` payload.
    pub fn progress(&self) -> Option<(u32, u32)> {
        if let (Some(copies), Some(pages)) = (self.print_copies, self.print_pages) {
            return Some((copies, pages));
        }
        let info = self.info_json()?;
        let copies = info.get("printCopies")?.as_u64()?;
        let pages = info.get("printPages")?.as_u64()?;
        Some((copies as u32, pages as u32))
    }

    /// A push is the completion signal when it is error-free and reports at
    /// least one copy and one page.
    pub fn completion(&self) -> Option<(u32, u32)> {
        if !self.is_success() {
            return None;
        }
        self.progress()
            .filter(|(copies, pages)| *copies >= 1 && *pages >= 1)
    }
}

/// A frame received from the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    pub api_name: String,
    #[serde(default)]
    pub result_ack: ResultAck,
}

impl InboundMessage {
    pub fn decode(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn is_push(&self) -> bool {
        self.api_name == PUSH_API_NAME
    }
}

/// Parse a `getAllPrinters` payload (`{"name": port, ...}`) into devices.
///
/// Ports may arrive as numbers or numeric strings. Entries with any other
/// port value are skipped.
pub fn parse_device_list(ack: &ResultAck) -> Vec<PrinterDevice> {
    let Some(Value::Object(map)) = ack.info_json() else {
        return Vec::new();
    };
    let sorted: BTreeMap<String, Value> = map.into_iter().collect();
    sorted
        .into_iter()
        .filter_map(|(name, port)| {
            let port = match port {
                Value::Number(n) => n.as_i64()?,
                Value::String(s) => s.trim().parse().ok()?,
                _ => return None,
            };
            Some(PrinterDevice { name, port })
        })
        .collect()
}
