//! Update programs and seed data for the slime mold demo.
//!
//! Two state variables: `positionTexture` holds one agent per texel (xy
//! position in the unit square, heading in z), `trailTexture` holds the
//! pheromone field the agents steer by and deposit into. Each depends on the
//! other, which is exactly the cycle the scheduler's double buffering exists
//! for.

use texsched::SeedTexture;

/// Agents live in a GRID_SIDE x GRID_SIDE position texture.
pub const GRID_SIDE: u32 = 32;
pub const PARTICLE_COUNT: u32 = GRID_SIDE * GRID_SIDE;

/// Off-screen buffer the particles are rasterized into.
pub const OUTPUT_SIZE: u32 = 1024;
pub const POINT_SIZE: f32 = 4.0;

// Steering parameters, tunable at runtime through set_uniform. Angles in
// degrees per tick, distances in state texels.
pub const SENSOR_ANGLE: f32 = 2.0;
pub const ROTATE_ANGLE: f32 = 4.0;
pub const SENSOR_OFFSET: f32 = 12.0;
pub const STEP_SIZE: f32 = 0.1;

/// Steer each agent toward the strongest trail and step forward.
///
/// Headings are stored as turns (0-1) in the z channel so every channel
/// stays in a friendly display range.
pub const POSITION_UPDATE: &str = r#"
const TAU: f32 = 6.28318530718;

fn trail_at(p: vec2<f32>) -> f32 {
    return textureSampleLevel(trailTexture, state_sampler, p, 0.0).r;
}

fn update(coord: vec2<f32>) -> vec4<f32> {
    let state = textureSampleLevel(positionTexture, state_sampler, coord, 0.0);
    var pos = state.xy;
    var heading = state.z * TAU;

    let texel = 1.0 / params.resolution.x;
    let sensor_angle = params.sa * TAU / 360.0;
    let rotate_angle = params.ra * TAU / 360.0;
    let sensor_dist = params.so * texel;

    let ahead = trail_at(pos + vec2<f32>(cos(heading), sin(heading)) * sensor_dist);
    let left = trail_at(
        pos + vec2<f32>(cos(heading + sensor_angle), sin(heading + sensor_angle)) * sensor_dist,
    );
    let right = trail_at(
        pos + vec2<f32>(cos(heading - sensor_angle), sin(heading - sensor_angle)) * sensor_dist,
    );

    if left > ahead && left > right {
        heading += rotate_angle;
    } else if right > ahead && right > left {
        heading -= rotate_angle;
    } else if left > ahead && right > ahead {
        // Blocked ahead. Break the tie per agent, varying over time.
        let coin = fract(sin(dot(pos, vec2<f32>(12.9898, 78.233)) + params.time) * 43758.5453);
        heading += select(-rotate_angle, rotate_angle, coin > 0.5);
    }

    pos = fract(pos + vec2<f32>(cos(heading), sin(heading)) * params.ss * texel);

    return vec4<f32>(pos, fract(heading / TAU), 1.0);
}
"#;

/// Diffuse and decay the trail, then add deposits from every agent.
///
/// Deposit is a gather: each trail texel scans the whole position texture
/// and claims agents within half a texel. At 32x32 that is a thousand
/// texture reads per trail texel.
pub const TRAIL_UPDATE: &str = r#"
const DECAY: f32 = 0.96;
const DEPOSIT: f32 = 0.35;

fn update(coord: vec2<f32>) -> vec4<f32> {
    let texel = 1.0 / params.resolution;

    var sum = 0.0;
    for (var dy = -1; dy <= 1; dy++) {
        for (var dx = -1; dx <= 1; dx++) {
            let offset = vec2<f32>(f32(dx), f32(dy)) * texel;
            sum += textureSampleLevel(trailTexture, state_sampler, coord + offset, 0.0).r;
        }
    }
    var trail = (sum / 9.0) * DECAY;

    let side = i32(params.resolution.x);
    for (var j = 0; j < side; j++) {
        for (var i = 0; i < side; i++) {
            let agent_uv = (vec2<f32>(f32(i), f32(j)) + vec2<f32>(0.5)) / params.resolution;
            let agent = textureSampleLevel(positionTexture, state_sampler, agent_uv, 0.0);
            // Wrap-aware distance, agents and trail both tile.
            let d = abs(fract(agent.xy - coord + vec2<f32>(0.5)) - vec2<f32>(0.5));
            if max(d.x, d.y) < 0.5 * texel.x {
                trail += DEPOSIT;
            }
        }
    }

    return vec4<f32>(min(trail, 1.0), 0.0, 0.0, 1.0);
}
"#;

fn hash01(seed: u32) -> f32 {
    let x = seed.wrapping_mul(1103515245).wrapping_add(12345);
    let x = x ^ (x >> 16);
    (x & 0x7FFF_FFFF) as f32 / 0x7FFF_FFFF as f32
}

/// Random agent positions and headings across the unit square.
pub fn position_seed() -> SeedTexture {
    SeedTexture::from_fn(GRID_SIDE, GRID_SIDE, |x, y| {
        let i = y * GRID_SIDE + x;
        [hash01(i * 3), hash01(i * 3 + 1), hash01(i * 3 + 2), 1.0]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The header the scheduler generates for these variables: params with
    /// the demo's uniforms, the shared sampler, one texture per dependency.
    /// Appending a demo body and the standard entry points must produce a
    /// valid module.
    fn demo_scaffold(body: &str, uniform_fields: &str) -> String {
        format!(
            r#"
struct Params {{
    resolution: vec2<f32>,
    _pad: vec2<f32>,
{uniform_fields}
}};

@group(0) @binding(0)
var<uniform> params: Params;
@group(0) @binding(1)
var state_sampler: sampler;
@group(0) @binding(2)
var positionTexture: texture_2d<f32>;
@group(0) @binding(3)
var trailTexture: texture_2d<f32>;

{body}

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> @builtin(position) vec4<f32> {{
    var positions = array<vec2<f32>, 3>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(3.0, -1.0),
        vec2<f32>(-1.0, 3.0),
    );
    return vec4<f32>(positions[vertex_index], 0.0, 1.0);
}}

@fragment
fn fs_main(@builtin(position) frag_coord: vec4<f32>) -> @location(0) vec4<f32> {{
    return update(frag_coord.xy / params.resolution);
}}
"#
        )
    }

    fn validate_wgsl(code: &str) {
        let module = naga::front::wgsl::parse_str(code)
            .unwrap_or_else(|e| panic!("WGSL parse error: {:?}", e));
        let mut validator = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        );
        validator
            .validate(&module)
            .unwrap_or_else(|e| panic!("WGSL validation error: {:?}", e));
    }

    #[test]
    fn test_position_update_validates() {
        let shader = demo_scaffold(
            POSITION_UPDATE,
            "    time: f32,\n    sa: f32,\n    ra: f32,\n    so: f32,\n    ss: f32,",
        );
        validate_wgsl(&shader);
    }

    #[test]
    fn test_trail_update_validates() {
        let shader = demo_scaffold(TRAIL_UPDATE, "");
        validate_wgsl(&shader);
    }

    #[test]
    fn test_position_seed_stays_in_the_unit_square() {
        let seed = position_seed();
        assert_eq!(seed.width, GRID_SIDE);
        assert_eq!(seed.height, GRID_SIDE);
        for i in 0..PARTICLE_COUNT {
            let texel = seed.texel(i % GRID_SIDE, i / GRID_SIDE);
            assert!((0.0..=1.0).contains(&texel[0]));
            assert!((0.0..=1.0).contains(&texel[1]));
            assert!((0.0..=1.0).contains(&texel[2]));
            assert_eq!(texel[3], 1.0);
        }
    }

    #[test]
    fn test_position_seed_is_not_uniform() {
        let seed = position_seed();
        let first = seed.texel(0, 0);
        let any_different = (0..GRID_SIDE)
            .flat_map(|y| (0..GRID_SIDE).map(move |x| (x, y)))
            .any(|(x, y)| seed.texel(x, y) != first);
        assert!(any_different);
    }
}
