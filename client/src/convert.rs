//! Conversions between bevy (glam) and navigation (nalgebra) vectors.

use bevy::prelude::Vec3;

pub type NavVec3 = navigation::Vec3;

pub fn to_bevy(v: &NavVec3) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}

pub fn to_nav(v: Vec3) -> NavVec3 {
    NavVec3::new(v.x, v.y, v.z)
}
