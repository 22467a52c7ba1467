mod common;

use std::sync::mpsc;
use std::time::{Duration, Instant};

use common::*;
use display_plugin::render::device::headless::{DeviceCall, HeadlessDevice};
use display_plugin::render::device::{Capabilities, TextureId};
use display_plugin::render::draw::MeshVertex;
use display_plugin::render::loader::MAX_DECODE_WORKERS;
use display_plugin::render::frame::Topology;
use display_plugin::render::{BitmapId, BlendMode, DecodedImage, Display, LoadEvent, Rgba, Smoothing};
use display_plugin::util::config::DisplayConfig;
use display_plugin::DisplayError;

fn texture(d: &Display<HeadlessDevice>, id: BitmapId) -> TextureId {
    TextureId(d.bitmap_texture_id(id).unwrap())
}

/// Polls until no decode is in flight, collecting every event.
fn wait_for_loads(d: &mut Display<HeadlessDevice>) -> Vec<LoadEvent> {
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut events = Vec::new();
    while d.pending_loads() > 0 {
        assert!(Instant::now() < deadline, "decode did not finish");
        events.extend(d.poll_loads().unwrap());
        std::thread::sleep(Duration::from_millis(5));
    }
    events
}

#[test]
fn destinations_must_share_a_size() {
    let mut d = display();
    let screen = d.screen_bitmap();
    let a = d.create_bitmap(64, 64).unwrap();
    let b = d.create_bitmap(32, 32).unwrap();

    assert!(matches!(d.set_destination_bitmaps(&[a, b]), Err(DisplayError::DestinationMismatch(_))));
    assert!(matches!(d.set_destination_bitmaps(&[screen, a]), Err(DisplayError::DestinationMismatch(_))));
    assert_eq!(d.set_destination_bitmaps(&[]).unwrap_err(), DisplayError::NoDestination);
    assert_eq!(d.destinations(), &[screen]);
}

#[test]
fn destination_list_is_truncated_to_the_draw_buffers() {
    let caps = Capabilities { draw_buffers: 2, ..Capabilities::default() };
    let mut d = display_with(caps, 64);
    let ids: Vec<_> = (0..3).map(|_| d.create_bitmap(64, 64).unwrap()).collect();

    d.set_destination_bitmaps(&ids).unwrap();
    assert_eq!(d.destinations(), &ids[..2]);
    let targets = vec![texture(&d, ids[0]), texture(&d, ids[1])];
    assert!(d.device().calls().contains(&DeviceCall::BindRenderTargets(targets)));
}

#[test]
fn deleting_a_destination_falls_back_to_the_screen() {
    let mut d = display();
    let screen = d.screen_bitmap();
    let target = d.create_bitmap(64, 64).unwrap();
    d.set_destination_bitmaps(&[target]).unwrap();
    d.device_mut().clear_calls();

    d.delete_bitmap(target).unwrap();
    assert_eq!(d.destinations(), &[screen]);
    assert!(d.device().calls().contains(&DeviceCall::BindScreen));
}

#[test]
fn deleting_a_queued_bitmap_flushes_first() {
    let mut d = display();
    let b = d.create_bitmap(16, 16).unwrap();
    let tex = texture(&d, b);
    blit(&mut d, b, 0.0);

    d.delete_bitmap(b).unwrap();
    let calls = d.device().calls();
    let draw = calls.iter().position(|c| matches!(c, DeviceCall::DrawElements { .. })).unwrap();
    let delete = calls.iter().position(|c| *c == DeviceCall::DeleteTexture(tex)).unwrap();
    assert!(draw < delete);
    assert!(!d.is_resident(b));
}

#[test]
fn stale_handles_are_rejected() {
    let mut d = display();
    let old = d.create_bitmap(8, 8).unwrap();
    d.delete_bitmap(old).unwrap();
    let new = d.create_bitmap(8, 8).unwrap();

    assert_ne!(old, new);
    assert_eq!(d.bitmap_size(old).unwrap_err(), DisplayError::InvalidHandle);
    assert_eq!(
        d.blit_bitmap(old, 0.0, 0.0, Smoothing::Default, BlendMode::Alpha).unwrap_err(),
        DisplayError::InvalidHandle
    );
    assert_eq!(d.delete_bitmap(old).unwrap_err(), DisplayError::InvalidHandle);
    assert_eq!(BitmapId::from_raw(new.to_raw()), Some(new));
    assert_eq!(BitmapId::from_raw(0), None);
}

#[test]
fn screen_cannot_be_deleted_drawn_or_read() {
    let mut d = display();
    let screen = d.screen_bitmap();
    assert_eq!(d.delete_bitmap(screen).unwrap_err(), DisplayError::ScreenNotAllowed);
    assert_eq!(
        d.blit_bitmap(screen, 0.0, 0.0, Smoothing::Default, BlendMode::Alpha).unwrap_err(),
        DisplayError::ScreenNotAllowed
    );
    let mut out = vec![0; (SCREEN_W * SCREEN_H * 4) as usize];
    assert_eq!(d.get_bitmap_data(screen, &mut out).unwrap_err(), DisplayError::ScreenNotAllowed);
}

#[test]
fn clear_bitmap_restores_the_destinations() {
    let mut d = display();
    let screen = d.screen_bitmap();
    let target = d.create_bitmap(32, 32).unwrap();
    let red = Rgba::new(255, 0, 0, 255);
    d.device_mut().clear_calls();

    d.clear_bitmap(target, red).unwrap();
    let calls = d.device().calls();
    let bind = calls.iter().position(|c| *c == DeviceCall::BindRenderTargets(vec![texture(&d, target)])).unwrap();
    let clear = calls.iter().position(|c| *c == DeviceCall::Clear(red)).unwrap();
    let back = calls.iter().rposition(|c| *c == DeviceCall::BindScreen).unwrap();
    assert!(bind < clear && clear < back);
    assert_eq!(d.destinations(), &[screen]);
}

#[test]
fn async_load_swaps_in_the_decoded_pixels() {
    let mut d = display();
    let (release, gate) = mpsc::channel::<()>();
    let id = d
        .load_bitmap_async(4, 4, move || {
            let _ = gate.recv();
            Ok(DecodedImage { width: 2, height: 3, pixels: vec![9; 24] })
        })
        .unwrap();

    assert_eq!(d.bitmap_size(id).unwrap(), (4, 4));
    assert_eq!(d.pending_loads(), 1);
    assert!(d.poll_loads().unwrap().is_empty());
    // The placeholder is drawable while the decode runs.
    blit(&mut d, id, 0.0);

    release.send(()).unwrap();
    assert_eq!(wait_for_loads(&mut d), vec![LoadEvent::Loaded(id)]);
    assert_eq!(d.bitmap_size(id).unwrap(), (2, 3));
    assert_eq!(d.device().draw_count(), 1);

    let mut out = vec![0; 24];
    d.get_bitmap_data(id, &mut out).unwrap();
    assert_eq!(out, vec![9; 24]);
}

#[test]
fn failed_decodes_are_reported() {
    let mut d = display();
    let broken = d.load_bitmap_async(4, 4, || Err("corrupt header".to_string())).unwrap();
    let short = d
        .load_bitmap_async(2, 2, || Ok(DecodedImage { width: 2, height: 2, pixels: vec![0; 3] }))
        .unwrap();

    let events = wait_for_loads(&mut d);
    assert_eq!(events.len(), 2);
    assert!(events.contains(&LoadEvent::Failed(broken, "corrupt header".into())));
    assert!(events.iter().any(|e| matches!(e, LoadEvent::Failed(id, reason) if *id == short && reason.contains("size mismatch"))));
    assert!(d.bitmap_size(broken).is_ok());
}

#[test]
fn delete_during_load_completes_when_the_decode_lands() {
    let mut d = display();
    let (release, gate) = mpsc::channel::<()>();
    let id = d
        .load_bitmap_async(4, 4, move || {
            let _ = gate.recv();
            Ok(DecodedImage { width: 4, height: 4, pixels: vec![0; 64] })
        })
        .unwrap();
    let placeholder = texture(&d, id);

    d.delete_bitmap(id).unwrap();
    assert!(d.bitmap_size(id).is_ok());

    release.send(()).unwrap();
    assert!(wait_for_loads(&mut d).is_empty());
    assert_eq!(d.bitmap_size(id).unwrap_err(), DisplayError::InvalidHandle);
    assert!(d.device().calls().contains(&DeviceCall::DeleteTexture(placeholder)));
    assert!(d.device().texture_data(placeholder).is_none());
}

#[test]
fn loading_bitmap_cannot_be_a_destination() {
    let mut d = display();
    let (release, gate) = mpsc::channel::<()>();
    let id = d
        .load_bitmap_async(8, 8, move || {
            let _ = gate.recv();
            Ok(DecodedImage { width: 8, height: 8, pixels: vec![0; 256] })
        })
        .unwrap();
    assert!(matches!(d.set_destination_bitmaps(&[id]), Err(DisplayError::DestinationMismatch(_))));
    release.send(()).unwrap();
    wait_for_loads(&mut d);
    d.set_destination_bitmaps(&[id]).unwrap();
}

#[test]
fn loading_bitmap_pixels_are_not_ready() {
    let mut d = display();
    let (release, gate) = mpsc::channel::<()>();
    let id = d
        .load_bitmap_async(2, 2, move || {
            let _ = gate.recv();
            Ok(DecodedImage { width: 2, height: 2, pixels: vec![7; 16] })
        })
        .unwrap();
    let placeholder = texture(&d, id);

    assert_eq!(d.set_bitmap_data(id, &[1; 16]).unwrap_err(), DisplayError::NotReady);
    let mut out = vec![0; 16];
    assert_eq!(d.get_bitmap_data(id, &mut out).unwrap_err(), DisplayError::NotReady);
    assert!(!d.device().calls().iter().any(|c| matches!(c, DeviceCall::UpdateTexture { texture } if *texture == placeholder)));

    release.send(()).unwrap();
    wait_for_loads(&mut d);
    d.get_bitmap_data(id, &mut out).unwrap();
    assert_eq!(out, vec![7; 16]);
    d.set_bitmap_data(id, &[1; 16]).unwrap();
}

#[test]
fn many_loads_run_on_a_bounded_worker_pool() {
    let mut d = display();
    let ids: Vec<_> = (0..24)
        .map(|_| {
            d.load_bitmap_async(1, 1, || Ok(DecodedImage { width: 1, height: 1, pixels: vec![5; 4] }))
                .unwrap()
        })
        .collect();
    assert!(d.decode_workers() >= 1);
    assert!(d.decode_workers() <= MAX_DECODE_WORKERS);

    let events = wait_for_loads(&mut d);
    assert_eq!(events.len(), ids.len());
    assert!(ids.iter().all(|id| events.contains(&LoadEvent::Loaded(*id))));
    assert!(d.decode_workers() <= MAX_DECODE_WORKERS);
}

#[test]
fn panicking_decoder_leaves_the_placeholder() {
    let mut d = display();
    let id = d.load_bitmap_async(4, 4, || panic!("truncated stream")).unwrap();
    let events = wait_for_loads(&mut d);
    assert_eq!(events, vec![LoadEvent::Failed(id, "decoder panicked".into())]);
    assert_eq!(d.bitmap_size(id).unwrap(), (4, 4));
}

#[test]
fn primitives_leave_the_blend_mode_unknown() {
    let mut d = display();
    let b = d.create_bitmap(16, 16).unwrap();
    blit(&mut d, b, 0.0);

    d.draw_line((0.0, 0.0), (10.0, 10.0), Rgba::WHITE).unwrap();
    assert_eq!(d.device().draw_count(), 1);
    assert!(d.device().calls().contains(&DeviceCall::DrawArrays { topology: Topology::Lines, count: 2 }));
    assert_eq!(d.blend_mode(), None);
    assert_eq!(d.device().calls().iter().rev().find(|c| matches!(c, DeviceCall::Blend(_))), Some(&DeviceCall::Blend(BlendMode::None)));

    blit(&mut d, b, 0.0);
    assert_eq!(d.blend_mode(), Some(BlendMode::Alpha));
    assert_eq!(d.device().calls().iter().rev().find(|c| matches!(c, DeviceCall::Blend(_))), Some(&DeviceCall::Blend(BlendMode::Alpha)));
}

#[test]
fn translucent_primitives_blend() {
    let mut d = display();
    d.draw_circle((50.0, 50.0), 10.0, Rgba::new(0, 0, 255, 128), true).unwrap();
    assert!(d.device().calls().contains(&DeviceCall::Blend(BlendMode::Alpha)));
    assert!(d.device().calls().contains(&DeviceCall::DrawArrays { topology: Topology::TriangleFan, count: 32 }));
}

#[test]
fn concave_polygon_is_triangulated() {
    let mut d = display();
    let arrow = [(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (5.0, 5.0), (0.0, 10.0)];
    d.draw_polygon(&arrow, Rgba::WHITE, true).unwrap();
    assert!(d.device().calls().contains(&DeviceCall::DrawArrays { topology: Topology::Triangles, count: 9 }));

    d.draw_polygon(&arrow, Rgba::WHITE, false).unwrap();
    assert!(d.device().calls().contains(&DeviceCall::DrawArrays { topology: Topology::LineLoop, count: 5 }));
}

#[test]
fn mesh_is_drawn_directly_then_quads_resume() {
    let mut d = display();
    let b = d.create_bitmap(10, 10).unwrap();
    let vertex = |x: f32, u: f32| MeshVertex { x, y: 0.0, u, v: u, color: Rgba::WHITE };
    let mesh = [vertex(0.0, 0.0), vertex(10.0, 1.0), vertex(0.0, 1.0)];

    d.draw_mesh(b, Smoothing::Default, BlendMode::Alpha, &mesh, None).unwrap();
    let calls = d.device().calls();
    assert!(calls.contains(&DeviceCall::UploadIndices(vec![0, 1, 2])));
    assert!(calls.contains(&DeviceCall::DrawElements { topology: Topology::TriangleStrip, count: 3 }));
    let uploaded = uploads(&d).pop().unwrap();
    assert!((uploaded[0].u - 0.01).abs() < 1e-6);
    assert!((uploaded[1].u - 0.99).abs() < 1e-6);
    assert_eq!(d.pending_vertices(), 0);

    blit(&mut d, b, 0.0);
    assert_eq!(count(&d, |c| matches!(c, DeviceCall::QuadIndices(_))), 2);
    d.flush().unwrap();
    assert_eq!(d.device().draw_count(), 2);
}

#[test]
fn indexed_mesh_uses_triangles() {
    let mut d = display();
    let b = d.create_bitmap(8, 8).unwrap();
    let v = |x: f32, y: f32| MeshVertex { x, y, u: 0.0, v: 0.0, color: Rgba::WHITE };
    let mesh = [v(0.0, 0.0), v(8.0, 0.0), v(8.0, 8.0), v(0.0, 8.0)];
    d.draw_mesh(b, Smoothing::Default, BlendMode::Alpha, &mesh, Some(&[0, 1, 2, 0, 2, 3])).unwrap();
    assert!(d.device().calls().contains(&DeviceCall::DrawElements { topology: Topology::Triangles, count: 6 }));
}

#[test]
fn invalid_meshes_are_rejected() {
    let mut d = display();
    let b = d.create_bitmap(8, 8).unwrap();
    let v = MeshVertex { x: 0.0, y: 0.0, u: 0.0, v: 0.0, color: Rgba::WHITE };

    assert!(matches!(
        d.draw_mesh(b, Smoothing::Default, BlendMode::Alpha, &[v, v], None),
        Err(DisplayError::InvalidMesh(_))
    ));
    assert!(matches!(
        d.draw_mesh(b, Smoothing::Default, BlendMode::Alpha, &[v, v, v], Some(&[0, 1, 5])),
        Err(DisplayError::InvalidMesh(_))
    ));
    assert_eq!(d.device().draw_count(), 0);
}

#[test]
fn depth_buffer_setting_reaches_the_device() {
    let d = display();
    assert!(d.device().calls().contains(&DeviceCall::DepthTest(false)));
    assert!(!d.device().calls().contains(&DeviceCall::DepthTest(true)));

    let config = DisplayConfig::from_str_lenient("backend = dummy\ndepth_buffer = on\nwidth = 64\nheight = 64\n").unwrap();
    let mut d = Display::new(HeadlessDevice::new(Capabilities::default()), config).unwrap();
    assert!(d.device().calls().contains(&DeviceCall::DepthTest(true)));

    let screen = d.screen_bitmap();
    d.clear_bitmap(screen, Rgba::new(0, 0, 0, 255)).unwrap();
    assert_eq!(count(&d, |c| matches!(c, DeviceCall::DepthTest(_))), 1);
}
