//! Name-based registry of per-event arrays.
//!
//! Export collaborators enumerate the registry instead of holding pointers
//! into the buffers. Every entry borrows the [`ChannelBuffer`], so views
//! cannot outlive the event they describe.

use crate::buffer::{ChannelBuffer, SideBuffer};
use crate::paddle::Side;

/// Read-only view of one exported quantity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VariableView<'a> {
    /// Floating-point values, one per paddle or per hit.
    Float(&'a [f64]),
    /// Counters, one per paddle or per hit.
    Count(&'a [u32]),
    /// Status bits, one per paddle.
    Flag(&'a [u8]),
    /// Paddle indices.
    Index(&'a [usize]),
    /// A single per-event counter.
    Scalar(usize),
}

impl VariableView<'_> {
    /// Number of elements in the view (1 for scalars).
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            VariableView::Float(v) => v.len(),
            VariableView::Count(v) => v.len(),
            VariableView::Flag(v) => v.len(),
            VariableView::Index(v) => v.len(),
            VariableView::Scalar(_) => 1,
        }
    }

    /// True for empty array views.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element `i` as a float, for exporters that store everything as
    /// doubles.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn get_f64(&self, i: usize) -> Option<f64> {
        match self {
            VariableView::Float(v) => v.get(i).copied(),
            VariableView::Count(v) => v.get(i).map(|&x| f64::from(x)),
            VariableView::Flag(v) => v.get(i).map(|&x| f64::from(x)),
            VariableView::Index(v) => v.get(i).map(|&x| x as f64),
            VariableView::Scalar(x) => (i == 0).then_some(*x as f64),
        }
    }
}

/// A named, described view.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable<'a> {
    /// Export name.
    pub name: String,
    /// Human-readable description.
    pub description: &'static str,
    /// The values.
    pub view: VariableView<'a>,
}

fn side_variables<'a>(side: Side, buf: &'a SideBuffer, out: &mut Vec<Variable<'a>>) {
    let p = side.prefix();
    let mut add = |suffix: &str, description: &'static str, view: VariableView<'a>| {
        out.push(Variable {
            name: format!("{p}{suffix}"),
            description,
            view,
        });
    };

    add(
        "t_nhit",
        "Number of TDC hits on this side",
        VariableView::Scalar(buf.tdc_hits as usize),
    );
    add(
        "a_nhit",
        "Number of FADC amplitudes on this side",
        VariableView::Scalar(buf.adc_hits as usize),
    );
    add(
        "nhits",
        "TDC hits per PMT",
        VariableView::Count(&buf.tdc_multiplicity),
    );
    add(
        "t",
        "Raw TDC times (channels)",
        VariableView::Float(&buf.tdc),
    );
    add(
        "t_t",
        "TDC times without corrections",
        VariableView::Float(&buf.tdc_t),
    );
    add(
        "_off",
        "Offset corrections",
        VariableView::Float(&buf.offset),
    );
    add(
        "t_o",
        "Offset-corrected times before timewalk",
        VariableView::Float(&buf.tdc_o),
    );
    add(
        "tw",
        "Timewalk corrections",
        VariableView::Float(&buf.timewalk),
    );
    add(
        "t_c",
        "Corrected TDC times",
        VariableView::Float(&buf.tdc_c),
    );
    add("a", "FADC peak amplitudes", VariableView::Float(&buf.adc));
    add(
        "a_p",
        "Pedestal-subtracted amplitudes",
        VariableView::Float(&buf.adc_p),
    );
    add(
        "a_c",
        "Corrected amplitudes",
        VariableView::Float(&buf.adc_c),
    );
    add(
        "t_fadc",
        "FADC crossing times (samples)",
        VariableView::Float(&buf.fadc_time),
    );
    add(
        "t_fadc_c",
        "Corrected FADC times",
        VariableView::Float(&buf.fadc_time_c),
    );
    add(
        "ped_fadc",
        "Measured FADC pedestals",
        VariableView::Float(&buf.fadc_pedestal),
    );
    add(
        "integral",
        "Pedestal-subtracted FADC integrals",
        VariableView::Float(&buf.fadc_integral),
    );
    add(
        "overflow",
        "FADC overflow bits",
        VariableView::Flag(&buf.overflow),
    );
    add(
        "underflow",
        "FADC underflow bits",
        VariableView::Flag(&buf.underflow),
    );
    add(
        "pedq",
        "FADC pedestal quality bits",
        VariableView::Flag(&buf.pedestal_quality),
    );
}

impl ChannelBuffer {
    /// Every exported quantity, left side first, then the plane results.
    #[must_use]
    pub fn variables(&self) -> Vec<Variable<'_>> {
        let mut out = Vec::with_capacity(64);
        side_variables(Side::Left, &self.left, &mut out);
        side_variables(Side::Right, &self.right, &mut out);

        let plane = &self.plane;
        let hits = &self.hits;
        let mut add = |name: &str, description: &'static str, view| {
            out.push(Variable {
                name: name.to_string(),
                description,
                view,
            });
        };
        add(
            "nhit",
            "Number of paddles with complete TDC hits",
            VariableView::Scalar(hits.len()),
        );
        add(
            "hit_pad",
            "Paddles with complete TDC hits",
            VariableView::Index(hits.paddles()),
        );
        add(
            "hit_matches",
            "Tracks matching each hit",
            VariableView::Count(hits.matches()),
        );
        add(
            "time",
            "Corrected paddle times",
            VariableView::Float(&plane.time),
        );
        add(
            "dtime",
            "Paddle time uncertainties",
            VariableView::Float(&plane.dtime),
        );
        add(
            "t_pl",
            "Path-length corrections",
            VariableView::Float(&plane.t_pl),
        );
        add(
            "time_pl",
            "Path-length-corrected times",
            VariableView::Float(&plane.time_pl),
        );
        add(
            "ampl",
            "Paddle amplitudes",
            VariableView::Float(&plane.amplitude),
        );
        add(
            "yt",
            "Position from time difference",
            VariableView::Float(&plane.y_time),
        );
        add(
            "ya",
            "Position from amplitude ratio",
            VariableView::Float(&plane.y_amplitude),
        );
        add(
            "matches",
            "Tracks matching each paddle",
            VariableView::Count(&plane.matches),
        );
        out
    }

    /// Look up one exported quantity by name.
    #[must_use]
    pub fn variable(&self, name: &str) -> Option<VariableView<'_>> {
        self.variables()
            .into_iter()
            .find(|v| v.name == name)
            .map(|v| v.view)
    }
}
