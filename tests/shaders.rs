mod common;

use common::*;
use display_plugin::render::device::headless::{DeviceCall, HeadlessDevice};
use display_plugin::render::device::{Capabilities, ProgramId};
use display_plugin::render::shader::ShaderPhase;
use display_plugin::render::{Display, ParamId, ParamKind, ShaderId, ShaderParam};
use display_plugin::DisplayError;

const TINT: &str = "void main() { gl_FragColor = gl_Color * texture2D(_Texture_, gl_TexCoord[0].xy); }";

fn shader(d: &mut Display<HeadlessDevice>, params: Vec<ShaderParam>, custom: bool) -> (ShaderId, ProgramId) {
    let id = d.create_shader(TINT, params, custom).unwrap();
    let program = d
        .device()
        .calls()
        .iter()
        .rev()
        .find_map(|c| match c {
            DeviceCall::CompileProgram(p) => Some(*p),
            _ => None,
        })
        .unwrap();
    (id, program)
}

#[test]
fn stop_with_queued_geometry_defers_until_the_next_flush() {
    let mut d = display();
    let default = default_program(&d);
    let b = d.create_bitmap(16, 16).unwrap();
    let (s, program) = shader(&mut d, vec![], false);

    d.start_shader(s).unwrap();
    blit(&mut d, b, 0.0);
    blit(&mut d, b, 10.0);
    d.stop_shader(Some(s)).unwrap();

    assert_eq!(d.shader_phase(s).unwrap(), ShaderPhase::PendingRemoval);
    assert_eq!(d.active_shaders(), vec![s]);
    assert_eq!(d.device().draw_count(), 0);

    // The next draw flushes the two queued quads under the stopped shader first.
    blit(&mut d, b, 20.0);
    assert_eq!(d.device().draw_count(), 1);
    assert_eq!(d.shader_phase(s).unwrap(), ShaderPhase::Inactive);
    assert!(d.active_shaders().is_empty());
    assert_eq!(uploads(&d)[0].len(), 8);

    d.flush().unwrap();
    assert_eq!(programs_per_draw(&d), vec![Some(program), Some(default)]);
}

#[test]
fn stop_without_queued_geometry_is_immediate() {
    let mut d = display();
    let (s, _) = shader(&mut d, vec![], false);
    d.start_shader(s).unwrap();
    d.stop_shader(Some(s)).unwrap();
    assert_eq!(d.shader_phase(s).unwrap(), ShaderPhase::Inactive);
    assert_eq!(d.device().draw_count(), 0);
}

#[test]
fn custom_param_shader_flushes_on_stop() {
    let mut d = display();
    let b = d.create_bitmap(16, 16).unwrap();
    let (s, program) = shader(&mut d, vec![], true);

    d.start_shader(s).unwrap();
    blit(&mut d, b, 0.0);
    d.stop_shader(Some(s)).unwrap();

    assert_eq!(d.device().draw_count(), 1);
    assert_eq!(d.shader_phase(s).unwrap(), ShaderPhase::Inactive);
    assert_eq!(programs_per_draw(&d), vec![Some(program)]);
    assert_eq!(d.pending_vertices(), 0);
}

#[test]
fn restart_before_the_flush_keeps_the_shader() {
    let mut d = display();
    let b = d.create_bitmap(16, 16).unwrap();
    let (s, program) = shader(&mut d, vec![], false);

    d.start_shader(s).unwrap();
    blit(&mut d, b, 0.0);
    d.stop_shader(Some(s)).unwrap();
    d.start_shader(s).unwrap();
    assert_eq!(d.shader_phase(s).unwrap(), ShaderPhase::Active);

    blit(&mut d, b, 10.0);
    assert_eq!(d.device().draw_count(), 0);
    d.flush().unwrap();
    assert_eq!(programs_per_draw(&d), vec![Some(program)]);
    assert_eq!(d.shader_phase(s).unwrap(), ShaderPhase::Active);
}

#[test]
fn every_active_shader_gets_a_pass_in_start_order() {
    let mut d = display();
    let b = d.create_bitmap(16, 16).unwrap();
    let (first, p1) = shader(&mut d, vec![], false);
    let (second, p2) = shader(&mut d, vec![], false);

    d.start_shader(first).unwrap();
    d.start_shader(second).unwrap();
    blit(&mut d, b, 0.0);
    d.flush().unwrap();

    assert_eq!(d.device().draw_count(), 2);
    assert_eq!(programs_per_draw(&d), vec![Some(p1), Some(p2)]);
}

#[test]
fn stop_none_restores_the_default_program_when_idle() {
    let mut d = display();
    let default = default_program(&d);
    d.device_mut().clear_calls();
    d.stop_shader(None).unwrap();
    assert!(d.device().calls().contains(&DeviceCall::UseProgram(default)));

    let (s, _) = shader(&mut d, vec![], false);
    d.start_shader(s).unwrap();
    d.device_mut().clear_calls();
    d.stop_shader(None).unwrap();
    assert!(d.device().calls().is_empty());
    assert_eq!(d.shader_phase(s).unwrap(), ShaderPhase::Active);
}

#[test]
fn texture_parameters_leave_one_unit_for_the_batch() {
    let caps = Capabilities { texture_units: 2, ..Capabilities::default() };
    let mut d = display_with(caps, 64);
    let params = vec![ShaderParam::new("mask", ParamKind::Texture), ShaderParam::new("overlay", ParamKind::Texture)];
    let (s, _) = shader(&mut d, params, false);

    let mask = d.parameter_id(s, "mask", None, true).unwrap();
    assert_eq!(mask, ParamId::Texture(0));
    assert_eq!(d.parameter_id(s, "mask", None, true).unwrap(), mask);
    assert_eq!(d.parameter_id(s, "overlay", None, true).unwrap_err(), DisplayError::TextureUnitsExhausted);
}

#[test]
fn unknown_parameter_is_reported() {
    let mut d = display();
    let (s, _) = shader(&mut d, vec![ShaderParam::new("time", ParamKind::Float)], false);
    assert!(matches!(d.parameter_id(s, "time", None, false), Ok(ParamId::Uniform(_))));
    assert_eq!(
        d.parameter_id(s, "missing", None, false).unwrap_err(),
        DisplayError::UnknownParameter("missing".into())
    );
}

#[test]
fn changing_a_uniform_of_a_running_shader_flushes() {
    let mut d = display();
    let b = d.create_bitmap(16, 16).unwrap();
    let (s, _) = shader(&mut d, vec![ShaderParam::new("time", ParamKind::Float)], false);
    let time = d.parameter_id(s, "time", None, false).unwrap();
    let ParamId::Uniform(location) = time else { panic!("uniform expected") };

    d.start_shader(s).unwrap();
    blit(&mut d, b, 0.0);
    d.set_shader_float(s, time, 1.5).unwrap();
    assert_eq!(d.device().draw_count(), 1);

    blit(&mut d, b, 0.0);
    d.set_shader_float(s, time, 1.5).unwrap();
    assert_eq!(d.device().draw_count(), 1);

    d.flush().unwrap();
    assert_eq!(d.device().draw_count(), 2);
    let sets = count(&d, |c| *c == DeviceCall::UniformF32 { location, value: 1.5 });
    assert_eq!(sets, 1);
}

#[test]
fn uniforms_of_an_idle_shader_do_not_flush() {
    let mut d = display();
    let b = d.create_bitmap(16, 16).unwrap();
    let (s, _) = shader(&mut d, vec![ShaderParam::new("dir", ParamKind::Vector)], false);
    let dir = d.parameter_id(s, "dir", None, false).unwrap();
    blit(&mut d, b, 0.0);
    d.set_shader_vector(s, dir, [0.0, 1.0, 0.0]).unwrap();
    assert_eq!(d.device().draw_count(), 0);
    assert!(d.set_shader_float(s, ParamId::Texture(0), 1.0).is_err());
}

#[test]
fn screen_is_captured_once_per_flush() {
    let mut d = display();
    let b = d.create_bitmap(16, 16).unwrap();
    let params = vec![ShaderParam::new("scene", ParamKind::Texture)];
    let (first, _) = shader(&mut d, params.clone(), false);
    let (second, _) = shader(&mut d, params, false);
    for s in [first, second] {
        let scene = d.parameter_id(s, "scene", None, true).unwrap();
        d.set_shader_bitmap(s, scene, None).unwrap();
        d.start_shader(s).unwrap();
    }

    blit(&mut d, b, 0.0);
    d.flush().unwrap();
    assert_eq!(d.device().draw_count(), 2);
    assert_eq!(count(&d, |c| matches!(c, DeviceCall::CopyScreen { .. })), 1);

    blit(&mut d, b, 0.0);
    d.flush().unwrap();
    assert_eq!(count(&d, |c| matches!(c, DeviceCall::CopyScreen { .. })), 2);
}

#[test]
fn deleting_a_running_shader_flushes_its_geometry() {
    let mut d = display();
    let b = d.create_bitmap(16, 16).unwrap();
    let (s, program) = shader(&mut d, vec![], false);
    d.start_shader(s).unwrap();
    blit(&mut d, b, 0.0);

    d.delete_shader(s).unwrap();
    assert_eq!(programs_per_draw(&d), vec![Some(program)]);
    assert!(d.device().calls().contains(&DeviceCall::DeleteProgram(program)));
    assert_eq!(d.shader_phase(s).unwrap_err(), DisplayError::InvalidHandle);
    assert!(d.active_shaders().is_empty());
}

#[test]
fn compile_failure_keeps_no_shader() {
    let mut d = display();
    d.device_mut().fail_marker = Some("BROKEN".into());
    let err = d.create_shader("void main() { BROKEN }", vec![], false).unwrap_err();
    assert!(matches!(err, DisplayError::ShaderCompile(_)));
    assert!(d.active_shaders().is_empty());
}
