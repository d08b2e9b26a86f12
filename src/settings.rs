//! Business profile: the single settings record used on receipts.
//!
//! The record has no identity field and is always written wholesale. Image
//! fields hold `data:` URLs produced by [`load_image`].

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{require_confirmation, PosError, PosResult};
use crate::store::{read_record, write_record, Store, StoreKey};

/// Upload ceiling for logo and QR images.
pub const MAX_IMAGE_BYTES: usize = 2 * 1024 * 1024;

pub const DEFAULT_CURRENCY: &str = "PKR";
pub const DEFAULT_THANK_YOU_TEXT: &str = "Thank you for your business!";
pub const DEFAULT_VISIT_AGAIN_TEXT: &str = "Visit us again";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ReceiptLayout {
    #[default]
    #[serde(rename = "layout1")]
    ModernClean,
    #[serde(rename = "layout2")]
    ProfessionalTable,
    #[serde(rename = "layout3")]
    MinimalSimple,
    #[serde(rename = "layout4")]
    DarkHeader,
    #[serde(rename = "layout5")]
    ElegantBoutique,
    #[serde(rename = "layout6")]
    BoxedCorporate,
    #[serde(rename = "layout7")]
    GradientPremium,
    #[serde(rename = "layout8")]
    BoldImpact,
    #[serde(rename = "layout9")]
    LuxuryGold,
    #[serde(rename = "layout10")]
    RetroClassic,
}

impl ReceiptLayout {
    /// Lenient parse of a stored selector; unknown values fall back to the
    /// dark-header layout, matching how receipts have always rendered them.
    pub fn from_value(value: Option<&str>) -> Self {
        match value.map(str::trim).map(str::to_ascii_lowercase).as_deref() {
            Some("layout1") => Self::ModernClean,
            Some("layout2") => Self::ProfessionalTable,
            Some("layout3") => Self::MinimalSimple,
            Some("layout5") => Self::ElegantBoutique,
            Some("layout6") => Self::BoxedCorporate,
            Some("layout7") => Self::GradientPremium,
            Some("layout8") => Self::BoldImpact,
            Some("layout9") => Self::LuxuryGold,
            Some("layout10") => Self::RetroClassic,
            _ => Self::DarkHeader,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::ModernClean => "Modern Clean",
            Self::ProfessionalTable => "Professional Table",
            Self::MinimalSimple => "Minimal Simple",
            Self::DarkHeader => "Dark Header",
            Self::ElegantBoutique => "Elegant Boutique",
            Self::BoxedCorporate => "Boxed Corporate",
            Self::GradientPremium => "Gradient Premium",
            Self::BoldImpact => "Bold Impact",
            Self::LuxuryGold => "Luxury Gold",
            Self::RetroClassic => "Retro Classic",
        }
    }
}

fn deserialize_layout<'de, D>(deserializer: D) -> Result<ReceiptLayout, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(ReceiptLayout::from_value(raw.as_deref()))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct BusinessSettings {
    pub business_name: String,
    pub owner_name: String,
    pub address: String,
    pub phone: String,
    pub email: String,
    pub logo: String,
    pub footer_logo: String,
    #[serde(rename = "paymentQR")]
    pub payment_qr: String,
    pub payment_text: String,
    #[serde(deserialize_with = "deserialize_layout")]
    pub receipt_layout: ReceiptLayout,
    pub currency: String,
    pub header_text: String,
    pub footer_text: String,
    pub thank_you_text: String,
    pub visit_again_text: String,
}

impl Default for BusinessSettings {
    fn default() -> Self {
        Self {
            business_name: String::new(),
            owner_name: String::new(),
            address: String::new(),
            phone: String::new(),
            email: String::new(),
            logo: String::new(),
            footer_logo: String::new(),
            payment_qr: String::new(),
            payment_text: String::new(),
            receipt_layout: ReceiptLayout::default(),
            currency: DEFAULT_CURRENCY.to_string(),
            header_text: String::new(),
            footer_text: String::new(),
            thank_you_text: DEFAULT_THANK_YOU_TEXT.to_string(),
            visit_again_text: DEFAULT_VISIT_AGAIN_TEXT.to_string(),
        }
    }
}

/// The three image slots on the profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageSlot {
    #[serde(rename = "logo", alias = "Logo")]
    Logo,
    #[serde(rename = "footerLogo", alias = "footer_logo")]
    FooterLogo,
    #[serde(rename = "paymentQR", alias = "payment_qr", alias = "paymentQr")]
    PaymentQr,
}

impl BusinessSettings {
    fn image_mut(&mut self, slot: ImageSlot) -> &mut String {
        match slot {
            ImageSlot::Logo => &mut self.logo,
            ImageSlot::FooterLogo => &mut self.footer_logo,
            ImageSlot::PaymentQr => &mut self.payment_qr,
        }
    }

    pub fn set_image(&mut self, slot: ImageSlot, data_url: String) {
        *self.image_mut(slot) = data_url;
    }

    pub fn clear_image(&mut self, slot: ImageSlot) {
        self.image_mut(slot).clear();
    }

    /// Set one text field by its camelCase record name.
    pub fn update_field(&mut self, field: &str, value: &str) -> PosResult<()> {
        let value = value.to_string();
        match field {
            "businessName" => self.business_name = value,
            "ownerName" => self.owner_name = value,
            "address" => self.address = value,
            "phone" => self.phone = value,
            "email" => self.email = value,
            "paymentText" => self.payment_text = value,
            "receiptLayout" => self.receipt_layout = ReceiptLayout::from_value(Some(value.as_str())),
            "currency" => self.currency = value,
            "headerText" => self.header_text = value,
            "footerText" => self.footer_text = value,
            "thankYouText" => self.thank_you_text = value,
            "visitAgainText" => self.visit_again_text = value,
            "logo" => self.logo = value,
            "footerLogo" => self.footer_logo = value,
            "paymentQR" => self.payment_qr = value,
            other => {
                return Err(PosError::validation(format!(
                    "Unknown settings field: {other}"
                )))
            }
        }
        Ok(())
    }

    /// Currency label for receipts, falling back to the default.
    pub fn currency_label(&self) -> &str {
        let trimmed = self.currency.trim();
        if trimmed.is_empty() {
            DEFAULT_CURRENCY
        } else {
            trimmed
        }
    }
}

// ---------------------------------------------------------------------------
// Store access
// ---------------------------------------------------------------------------

pub fn get_settings(store: &dyn Store) -> PosResult<BusinessSettings> {
    Ok(read_record(store, StoreKey::Settings)?.unwrap_or_default())
}

pub fn save_settings(store: &dyn Store, settings: &BusinessSettings) -> PosResult<()> {
    write_record(store, StoreKey::Settings, settings)?;
    info!(business = %settings.business_name, "Business settings saved");
    Ok(())
}

/// Clear the stored profile and hand back the defaults.
pub fn reset_settings(store: &dyn Store, confirmed: bool) -> PosResult<BusinessSettings> {
    require_confirmation(
        confirmed,
        "Are you sure you want to reset all settings? This action cannot be undone.",
    )?;
    store.remove(StoreKey::Settings)?;
    info!("Business settings reset to defaults");
    Ok(BusinessSettings::default())
}

// ---------------------------------------------------------------------------
// Image uploads
// ---------------------------------------------------------------------------

/// MIME type sniffed from the file's magic bytes.
pub fn sniff_image_mime(bytes: &[u8]) -> Option<&'static str> {
    image::guess_format(bytes).ok().map(|format| format.to_mime_type())
}

/// Validate an uploaded file and encode it as a `data:` URL.
///
/// `declared_mime` is what the picker reported; when absent the type is
/// sniffed from the bytes. Either way it must be an `image/*` type.
pub fn load_image(bytes: &[u8], declared_mime: Option<&str>) -> PosResult<String> {
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(PosError::validation("File size must be less than 2MB"));
    }

    let declared = declared_mime
        .map(str::trim)
        .filter(|mime| !mime.is_empty())
        .map(str::to_ascii_lowercase);
    let mime = match declared {
        Some(mime) => mime,
        None => sniff_image_mime(bytes).unwrap_or_default().to_string(),
    };
    if !mime.starts_with("image/") {
        return Err(PosError::validation("Please select an image file"));
    }

    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    debug!(mime = %mime, bytes = bytes.len(), "Image encoded as data URL");
    Ok(format!("data:{mime};base64,{encoded}"))
}
