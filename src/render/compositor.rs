use crate::composition::model::Clip;
use crate::composition::store::{PreparedAsset, PreparedAssetStore};
use crate::foundation::error::{VidloomError, VidloomResult};
use crate::render::surface::Surface;

/// Whether `clip` contributes to the frame at absolute time `t_us`.
pub fn needs_render(clip: &Clip, t_us: u64) -> bool {
    clip.is_active_at(t_us)
}

/// Composite one clip onto `surface` at absolute time `t_us`.
///
/// The clip's placement is applied as scale → translate → rotate on the
/// surface's transform stack; the asset draw routine then runs with the
/// clip-relative time. The prior transform is restored afterwards, pass or
/// fail.
pub fn render_clip(
    surface: &mut Surface,
    clip: &Clip,
    store: &PreparedAssetStore,
    t_us: u64,
) -> VidloomResult<()> {
    let asset = store.get(&clip.asset).ok_or_else(|| {
        VidloomError::render(format!("clip '{}' cannot be rendered", clip.id))
    })?;

    let w = f64::from(surface.width());
    let h = f64::from(surface.height());

    surface.save();
    surface.scale(clip.props.pos_width, clip.props.pos_height);
    surface.translate(clip.props.pos_left * w, clip.props.pos_top * h);
    surface.rotate(clip.props.rotation_rad);

    let local_us = clip.local_time_us(t_us);
    let result = match asset {
        PreparedAsset::Image(img) => surface.draw_image(img, w, h),
        PreparedAsset::ImageSequence(seq) => match seq.frame_at(local_us) {
            Some(img) => surface.draw_image(img, w, h),
            // An empty sequence draws nothing and is not an error.
            None => Ok(()),
        },
    };

    surface.restore();
    result
}

/// Clear `surface` to opaque black and draw every active clip in list order;
/// later clips paint over earlier ones.
pub fn composite_frame(
    surface: &mut Surface,
    clips: &[Clip],
    store: &PreparedAssetStore,
    t_us: u64,
) -> VidloomResult<()> {
    surface.clear([0, 0, 0, 255]);
    for clip in clips {
        if needs_render(clip, t_us) {
            render_clip(surface, clip, store, t_us)?;
        }
    }
    Ok(())
}
