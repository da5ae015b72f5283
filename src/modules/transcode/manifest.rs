use super::ladder::ResolutionLadder;

pub const MASTER_MANIFEST: &str = "master.m3u8";
pub const RUNG_MANIFEST: &str = "index.m3u8";
pub const SEGMENT_PATTERN: &str = "segment_%03d.ts";

/// Master playlist text. Rungs appear in ladder order, each as a
/// stream-descriptor line followed by the rung manifest's relative path.
pub fn render_master(ladder: &ResolutionLadder) -> String {
    let mut content = String::from("#EXTM3U\n");

    for rung in ladder.rungs() {
        content.push_str(&format!(
            "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}\n",
            rung.bandwidth,
            rung.resolution()
        ));
        content.push_str(&format!("{}/{}\n", rung.name, RUNG_MANIFEST));
    }

    content
}
