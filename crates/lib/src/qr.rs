//! QR publisher: encodes login challenges as PNG (served on `/qr`) and as terminal art (stdout).
//!
//! The current image lives in a `watch` channel: the session event loop is the only writer,
//! HTTP handlers hold readers. Each new challenge replaces the previous image.

use image::{GrayImage, ImageFormat, Luma};
use qrcodegen::{QrCode, QrCodeEcc};
use std::io::Cursor;
use std::sync::Arc;
use tokio::sync::watch;

/// Pixels per QR module in the PNG.
const PNG_SCALE: u32 = 4;
/// Quiet zone around the code in the PNG, in modules.
const PNG_MARGIN: u32 = 4;
/// Quiet zone for the terminal rendering, in modules.
const TERMINAL_MARGIN: i32 = 2;

#[derive(Debug, thiserror::Error)]
pub enum QrError {
    #[error("login challenge too long for a QR code: {0}")]
    TooLong(String),
    #[error("encoding QR image: {0}")]
    Image(#[from] image::ImageError),
}

/// An encoded login challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrImage {
    pub challenge: String,
    pub png: Vec<u8>,
}

impl QrImage {
    pub fn encode(challenge: &str) -> Result<Self, QrError> {
        Ok(Self {
            challenge: challenge.to_string(),
            png: encode_png(challenge)?,
        })
    }
}

fn encode(challenge: &str) -> Result<QrCode, QrError> {
    QrCode::encode_text(challenge, QrCodeEcc::Medium).map_err(|e| QrError::TooLong(e.to_string()))
}

/// Encode `challenge` as a grayscale PNG, black modules on white. Same input, same bytes.
pub fn encode_png(challenge: &str) -> Result<Vec<u8>, QrError> {
    let code = encode(challenge)?;
    let modules = code.size() as u32;
    let side = (modules + PNG_MARGIN * 2) * PNG_SCALE;
    let img = GrayImage::from_fn(side, side, |x, y| {
        let mx = (x / PNG_SCALE) as i32 - PNG_MARGIN as i32;
        let my = (y / PNG_SCALE) as i32 - PNG_MARGIN as i32;
        // get_module is false outside the symbol, which paints the quiet zone white.
        if code.get_module(mx, my) {
            Luma([0u8])
        } else {
            Luma([255u8])
        }
    });
    let mut png = Vec::new();
    img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(png)
}

/// Render `challenge` for a terminal with half-block characters (two module rows per line).
pub fn render_terminal(challenge: &str) -> Result<String, QrError> {
    let code = encode(challenge)?;
    let size = code.size();
    let dark = |x: i32, y: i32| code.get_module(x - TERMINAL_MARGIN, y - TERMINAL_MARGIN);
    let total = size + TERMINAL_MARGIN * 2;
    let mut out = String::new();
    for row in (0..total).step_by(2) {
        for x in 0..total {
            let ch = match (dark(x, row), dark(x, row + 1)) {
                (true, true) => '█',
                (true, false) => '▀',
                (false, true) => '▄',
                (false, false) => ' ',
            };
            out.push(ch);
        }
        out.push('\n');
    }
    Ok(out)
}

/// Writer side of the process-wide "last issued QR" slot.
pub struct QrPublisher {
    tx: watch::Sender<Option<Arc<QrImage>>>,
}

/// Reader side of the slot; cheap to clone into HTTP state.
#[derive(Clone)]
pub struct QrView {
    rx: watch::Receiver<Option<Arc<QrImage>>>,
}

impl Default for QrPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl QrPublisher {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    pub fn view(&self) -> QrView {
        QrView {
            rx: self.tx.subscribe(),
        }
    }

    /// Encode a new challenge, print it for the operator, and replace the current image.
    /// On encoding failure the previous image is kept.
    pub fn publish(&self, challenge: &str) -> Result<(), QrError> {
        log::info!("qr: login challenge received, scan it with the phone app (linked devices)");
        match render_terminal(challenge) {
            Ok(art) => println!("{}", art),
            Err(e) => log::warn!("qr: terminal rendering failed: {}", e),
        }
        let image = QrImage::encode(challenge)?;
        self.tx.send_replace(Some(Arc::new(image)));
        Ok(())
    }
}

impl QrView {
    /// The most recently published image, if any.
    pub fn current(&self) -> Option<Arc<QrImage>> {
        self.rx.borrow().clone()
    }
}
