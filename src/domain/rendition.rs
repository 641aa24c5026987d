use serde::{Deserialize, Serialize};

/// One rung of the bitrate ladder (spec.md §3, §6 "Rendition ladder").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rendition {
    pub label: &'static str,
    pub height: u32,
    pub video_bitrate: &'static str,
    pub maxrate: &'static str,
    pub bufsize: &'static str,
    pub audio_bitrate: &'static str,
}

/// The static ladder, bottom-up, exactly as spec.md §6 lists it.
pub const RENDITION_LADDER: [Rendition; 4] = [
    Rendition {
        label: "480p",
        height: 480,
        video_bitrate: "800k",
        maxrate: "856k",
        bufsize: "1200k",
        audio_bitrate: "96k",
    },
    Rendition {
        label: "720p",
        height: 720,
        video_bitrate: "2800k",
        maxrate: "2996k",
        bufsize: "4200k",
        audio_bitrate: "128k",
    },
    Rendition {
        label: "1080p",
        height: 1080,
        video_bitrate: "5000k",
        maxrate: "5350k",
        bufsize: "7500k",
        audio_bitrate: "192k",
    },
    Rendition {
        label: "2160p",
        height: 2160,
        video_bitrate: "15000k",
        maxrate: "16050k",
        bufsize: "22500k",
        audio_bitrate: "320k",
    },
];

/// Selection rule (spec.md §4.E step 1): keep renditions whose `height <=
/// item.height`; if that set is empty, fall back to the bottom rung alone.
pub fn select_renditions(item_height: u32) -> Vec<Rendition> {
    let selected: Vec<Rendition> = RENDITION_LADDER
        .iter()
        .copied()
        .filter(|r| r.height <= item_height)
        .collect();

    if selected.is_empty() {
        vec![RENDITION_LADDER[0]]
    } else {
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn height_below_480_falls_back_to_single_rung() {
        let r = select_renditions(300);
        assert_eq!(r.len(), 1);
        assert_eq!(r[0].label, "480p");
    }

    #[test]
    fn height_1080_selects_three_rungs() {
        let r = select_renditions(1080);
        let labels: Vec<_> = r.iter().map(|x| x.label).collect();
        assert_eq!(labels, vec!["480p", "720p", "1080p"]);
    }

    #[test]
    fn height_exactly_on_boundary_is_inclusive() {
        let r = select_renditions(720);
        let labels: Vec<_> = r.iter().map(|x| x.label).collect();
        assert_eq!(labels, vec!["480p", "720p"]);
    }

    #[test]
    fn ladder_order_is_preserved_bottom_up() {
        let r = select_renditions(2160);
        let heights: Vec<_> = r.iter().map(|x| x.height).collect();
        assert_eq!(heights, vec![480, 720, 1080, 2160]);
    }
}
