//! Serde proxy for glam types used in [`SimConfig`](crate::SimConfig).

/// Field-level (de)serialization for `glam::Vec3` via `#[serde(with)]`.
pub(crate) mod vec3 {
    use glam::Vec3;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct Vec3Def {
        x: f32,
        y: f32,
        z: f32,
    }

    pub fn serialize<S>(v: &Vec3, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        Vec3Def { x: v.x, y: v.y, z: v.z }.serialize(s)
    }

    pub fn deserialize<'de, D>(d: D) -> Result<Vec3, D::Error>
    where
        D: Deserializer<'de>,
    {
        let def = Vec3Def::deserialize(d)?;
        Ok(Vec3::new(def.x, def.y, def.z))
    }
}
