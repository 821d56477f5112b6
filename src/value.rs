//! Host-side literal values and their shader-script spelling.
//!
//! Everything the compiler writes into the generated program goes through
//! here: numeric literals, socket type names and identifier sanitization.

use serde::{Deserialize, Serialize};

use crate::graph::SocketType;

/// A host-side literal carried by a socket default or a node parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Float(f64),
    Vec2([f64; 2]),
    Vec3([f64; 3]),
    Vec4([f64; 4]),
    /// Euler XYZ angle triple, radians.
    Euler([f64; 3]),
    /// Row-major 4x4 matrix.
    Mat4([[f64; 4]; 4]),
}

/// Format a float the way the target shading language expects literals:
/// always with a decimal point, no exponent for ordinary magnitudes.
pub fn fmt_float(v: f64) -> String {
    if !v.is_finite() {
        return "0.0".to_string();
    }
    if v == v.trunc() && v.abs() < 1e15 {
        format!("{v:.1}")
    } else {
        format!("{v}")
    }
}

impl Value {
    /// Spell this value as a shader-script literal: `float(x)`, `vecN(...)`
    /// or `mat4(col, col, col, col)`. Matrices arrive row-major and are
    /// transposed here, the target language stores them column-major.
    pub fn to_script(&self) -> String {
        match self {
            Value::Float(v) => format!("float({})", fmt_float(*v)),
            Value::Vec2(v) => format!("vec2({})", join_floats(v)),
            Value::Vec3(v) | Value::Euler(v) => format!("vec3({})", join_floats(v)),
            Value::Vec4(v) => format!("vec4({})", join_floats(v)),
            Value::Mat4(m) => {
                let t = mat4_transpose(*m);
                let cols: Vec<String> =
                    t.iter().map(|col| format!("vec4({})", join_floats(col))).collect();
                format!("mat4({})", cols.join(", "))
            }
        }
    }

    /// Best-effort conversion from a JSON parameter or socket default.
    pub fn from_json(v: &serde_json::Value) -> Option<Value> {
        if let Some(f) = v.as_f64() {
            return Some(Value::Float(f));
        }
        let arr = v.as_array()?;
        let nums: Option<Vec<f64>> = arr.iter().map(|x| x.as_f64()).collect();
        match nums?.as_slice() {
            [a, b] => Some(Value::Vec2([*a, *b])),
            [a, b, c] => Some(Value::Vec3([*a, *b, *c])),
            [a, b, c, d] => Some(Value::Vec4([*a, *b, *c, *d])),
            _ => None,
        }
    }
}

fn join_floats(vals: &[f64]) -> String {
    let parts: Vec<String> = vals.iter().map(|v| fmt_float(*v)).collect();
    parts.join(", ")
}

impl SocketType {
    /// The script-level type a socket value is declared as. Only the three
    /// data-carrying socket types have one; asking for a shader or special
    /// socket's script type is a caller defect.
    pub fn script_type(self) -> &'static str {
        match self {
            SocketType::Value => "float",
            SocketType::Vector => "vec3",
            SocketType::Color => "vec4",
            SocketType::Shader | SocketType::Special => {
                panic!("socket type {self:?} has no script type")
            }
        }
    }

    /// Zero literal for sockets that carry no default value.
    pub fn zero_script(self) -> &'static str {
        match self {
            SocketType::Value => "float(0.0)",
            SocketType::Vector => "vec3(0.0, 0.0, 0.0)",
            SocketType::Color => "vec4(0.0, 0.0, 0.0, 0.0)",
            SocketType::Shader | SocketType::Special => {
                panic!("socket type {self:?} has no script zero")
            }
        }
    }
}

/// Strip every non-word character and lowercase the rest. The result may be
/// empty; composed identifiers always carry a generated prefix, and the final
/// identifier is asserted valid at declaration time.
pub fn sanitize_identifier(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// A syntactically valid script identifier: starts with a letter or
/// underscore, continues with word characters.
pub fn is_valid_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// 4x4 matrix helpers for the constant mapping branch. Row-major throughout;
// only `Value::to_script` transposes.

pub type Mat4 = [[f64; 4]; 4];

pub fn mat4_identity() -> Mat4 {
    let mut m = [[0.0; 4]; 4];
    for (i, row) in m.iter_mut().enumerate() {
        row[i] = 1.0;
    }
    m
}

pub fn mat4_mul(a: Mat4, b: Mat4) -> Mat4 {
    let mut out = [[0.0; 4]; 4];
    for i in 0..4 {
        for j in 0..4 {
            out[i][j] = (0..4).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}

pub fn mat4_transpose(m: Mat4) -> Mat4 {
    let mut out = [[0.0; 4]; 4];
    for i in 0..4 {
        for j in 0..4 {
            out[i][j] = m[j][i];
        }
    }
    out
}

/// Full 4x4 inverse. Singular matrices fall back to identity, matching the
/// safe-invert behavior of the host application.
pub fn mat4_invert(m: Mat4) -> Mat4 {
    let a = m;
    // Cofactor expansion over the first column of 2x2 sub-determinants.
    let s0 = a[0][0] * a[1][1] - a[1][0] * a[0][1];
    let s1 = a[0][0] * a[1][2] - a[1][0] * a[0][2];
    let s2 = a[0][0] * a[1][3] - a[1][0] * a[0][3];
    let s3 = a[0][1] * a[1][2] - a[1][1] * a[0][2];
    let s4 = a[0][1] * a[1][3] - a[1][1] * a[0][3];
    let s5 = a[0][2] * a[1][3] - a[1][2] * a[0][3];

    let c5 = a[2][2] * a[3][3] - a[3][2] * a[2][3];
    let c4 = a[2][1] * a[3][3] - a[3][1] * a[2][3];
    let c3 = a[2][1] * a[3][2] - a[3][1] * a[2][2];
    let c2 = a[2][0] * a[3][3] - a[3][0] * a[2][3];
    let c1 = a[2][0] * a[3][2] - a[3][0] * a[2][2];
    let c0 = a[2][0] * a[3][1] - a[3][0] * a[2][1];

    let det = s0 * c5 - s1 * c4 + s2 * c3 + s3 * c2 - s4 * c1 + s5 * c0;
    if det.abs() < 1e-12 {
        return mat4_identity();
    }
    let inv = 1.0 / det;

    [
        [
            (a[1][1] * c5 - a[1][2] * c4 + a[1][3] * c3) * inv,
            (-a[0][1] * c5 + a[0][2] * c4 - a[0][3] * c3) * inv,
            (a[3][1] * s5 - a[3][2] * s4 + a[3][3] * s3) * inv,
            (-a[2][1] * s5 + a[2][2] * s4 - a[2][3] * s3) * inv,
        ],
        [
            (-a[1][0] * c5 + a[1][2] * c2 - a[1][3] * c1) * inv,
            (a[0][0] * c5 - a[0][2] * c2 + a[0][3] * c1) * inv,
            (-a[3][0] * s5 + a[3][2] * s2 - a[3][3] * s1) * inv,
            (a[2][0] * s5 - a[2][2] * s2 + a[2][3] * s1) * inv,
        ],
        [
            (a[1][0] * c4 - a[1][1] * c2 + a[1][3] * c0) * inv,
            (-a[0][0] * c4 + a[0][1] * c2 - a[0][3] * c0) * inv,
            (a[3][0] * s4 - a[3][1] * s2 + a[3][3] * s0) * inv,
            (-a[2][0] * s4 + a[2][1] * s2 - a[2][3] * s0) * inv,
        ],
        [
            (-a[1][0] * c3 + a[1][1] * c1 - a[1][2] * c0) * inv,
            (a[0][0] * c3 - a[0][1] * c1 + a[0][2] * c0) * inv,
            (-a[3][0] * s3 + a[3][1] * s1 - a[3][2] * s0) * inv,
            (a[2][0] * s3 - a[2][1] * s1 + a[2][2] * s0) * inv,
        ],
    ]
}

pub fn translation_mat(v: [f64; 3]) -> Mat4 {
    let mut m = mat4_identity();
    m[0][3] = v[0];
    m[1][3] = v[1];
    m[2][3] = v[2];
    m
}

/// Euler XYZ rotation to a 4x4 matrix: X applied first, then Y, then Z.
pub fn euler_xyz_mat(e: [f64; 3]) -> Mat4 {
    let (sx, cx) = e[0].sin_cos();
    let (sy, cy) = e[1].sin_cos();
    let (sz, cz) = e[2].sin_cos();

    let rx = [
        [1.0, 0.0, 0.0, 0.0],
        [0.0, cx, -sx, 0.0],
        [0.0, sx, cx, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ];
    let ry = [
        [cy, 0.0, sy, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [-sy, 0.0, cy, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ];
    let rz = [
        [cz, -sz, 0.0, 0.0],
        [sz, cz, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ];
    mat4_mul(rz, mat4_mul(ry, rx))
}

pub fn scale_mat(v: [f64; 3]) -> Mat4 {
    let mut m = mat4_identity();
    m[0][0] = v[0];
    m[1][1] = v[1];
    m[2][2] = v[2];
    m
}
