use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::lang::Message;
use crate::types::{Audience, Banner, BannerStyle, MarkerId, Vec3};

static NEXT_OVERLAY_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug)]
pub struct OverlayOptions {
    pub max_banners_per_audience: usize,
    pub max_active_banners: usize,
    pub max_markers: usize,
}

impl Default for OverlayOptions {
    fn default() -> Self {
        Self {
            max_banners_per_audience: 3,
            max_active_banners: 32,
            max_markers: 16,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BannerView {
    pub id: String,
    pub name: &'static str,
    pub audience: Audience,
    pub message: Message,
    pub style: BannerStyle,
    pub created_at_ms: u64,
    pub expires_at_ms: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerView {
    pub id: MarkerId,
    pub position: Vec3,
    pub created_at_ms: u64,
}

/// Banners and world markers currently on screen, with banner expiry.
/// Markers have no expiry of their own; whoever placed one removes it.
pub struct Overlay {
    options: OverlayOptions,
    banners: Vec<BannerView>,
    markers: Vec<MarkerView>,
}

impl Overlay {
    pub fn new(options: OverlayOptions) -> Self {
        Self {
            options,
            banners: Vec::new(),
            markers: Vec::new(),
        }
    }

    /// A banner with the same name for the same audience is replaced.
    pub fn show_banner(&mut self, audience: &Audience, banner: Banner, now_ms: u64) -> String {
        self.prune(now_ms);
        self.banners
            .retain(|view| !(view.audience == *audience && view.name == banner.name));

        self.trim_audience_banners(audience);
        while self.banners.len() >= self.options.max_active_banners {
            self.banners.remove(0);
        }

        let id = format!("banner_{}", NEXT_OVERLAY_ID.fetch_add(1, Ordering::Relaxed));
        self.banners.push(BannerView {
            id: id.clone(),
            name: banner.name,
            audience: audience.clone(),
            message: banner.message,
            style: banner.style,
            created_at_ms: now_ms,
            expires_at_ms: now_ms.saturating_add(banner.ttl_ms),
        });
        id
    }

    /// `All` wipes every banner; any other audience only its own.
    pub fn clear_banners(&mut self, audience: &Audience) -> usize {
        let before = self.banners.len();
        match audience {
            Audience::All => self.banners.clear(),
            other => self.banners.retain(|view| view.audience != *other),
        }
        before - self.banners.len()
    }

    pub fn place_marker(&mut self, position: Vec3, now_ms: u64) -> MarkerId {
        while self.markers.len() >= self.options.max_markers {
            self.markers.remove(0);
        }
        let id = MarkerId(NEXT_OVERLAY_ID.fetch_add(1, Ordering::Relaxed));
        self.markers.push(MarkerView {
            id,
            position,
            created_at_ms: now_ms,
        });
        id
    }

    pub fn remove_marker(&mut self, id: MarkerId) -> bool {
        let before = self.markers.len();
        self.markers.retain(|marker| marker.id != id);
        before != self.markers.len()
    }

    pub fn markers(&self) -> &[MarkerView] {
        &self.markers
    }

    pub fn banners_for(&mut self, viewer: &str, admin: bool, now_ms: u64) -> Vec<BannerView> {
        self.prune(now_ms);
        self.banners
            .iter()
            .filter(|view| is_visible(&view.audience, viewer, admin))
            .cloned()
            .collect()
    }

    fn prune(&mut self, now_ms: u64) {
        self.banners.retain(|view| view.expires_at_ms > now_ms);
    }

    fn trim_audience_banners(&mut self, audience: &Audience) {
        let mut count = self
            .banners
            .iter()
            .filter(|view| view.audience == *audience)
            .count();
        if count < self.options.max_banners_per_audience {
            return;
        }

        let mut index = 0;
        while index < self.banners.len() && count >= self.options.max_banners_per_audience {
            if self.banners[index].audience == *audience {
                self.banners.remove(index);
                count -= 1;
                continue;
            }
            index += 1;
        }
    }
}

pub fn is_visible(audience: &Audience, viewer: &str, admin: bool) -> bool {
    match audience {
        Audience::All => true,
        Audience::Admins => admin,
        Audience::One(id) => id == viewer,
        Audience::AllExcept(id) => id != viewer,
    }
}
