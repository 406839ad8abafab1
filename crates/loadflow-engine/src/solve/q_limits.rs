//! Reactive-limit enforcement tests (PV-PQ switching).

#[cfg(test)]
mod tests {
    use crate::power;
    use crate::solve::{PfCase, PowerFlowSolver, SolveMethod};
    use crate::ybus::Ybus;
    use loadflow_core::{Branch, Bus, BusId, BusKind, Diagnostics, Network};

    /// Two-bus network where the PV bus cannot hold its voltage setpoint.
    ///
    /// Bus 1: reference. Bus 2: PV at 1.05 pu with a tight reactive band
    /// (0 to 10 Mvar) feeding a 50 Mvar reactive load. Holding 1.05 pu
    /// would take far more than 10 Mvar, so the bus must end the run pinned
    /// at Qmax and reclassified PQ.
    fn q_limited_network() -> Network {
        let buses = vec![
            Bus::new(1, "slack", "2"),
            Bus::new(2, "gen", "1")
                .with_voltage(1.05, 0.0)
                .with_generation(50.0, 0.0)
                .with_load(40.0, 50.0)
                .with_q_limits(0.0, 10.0),
        ];
        let branches = vec![Branch::line(1, 2, 1, 0.01, 0.1)];
        Network::load("q limited", buses, branches).unwrap()
    }

    fn solved_q_at_bus(network: &Network, result: &crate::solve::SolverResult, idx: usize) -> f64 {
        let mut diag = Diagnostics::new();
        let ybus = Ybus::from_network(network, &mut diag).unwrap();
        let v_mag: Vec<f64> = result.buses.iter().map(|b| b.magnitude.value()).collect();
        let v_ang: Vec<f64> = result.buses.iter().map(|b| b.angle.value()).collect();
        let (_, q_inj) = power::injection_at(&ybus, &v_mag, &v_ang, idx);
        q_inj
    }

    #[test]
    fn test_newton_pins_q_at_limit_and_switches_bus() {
        let mut network = q_limited_network();
        let mut diag = Diagnostics::new();
        let ybus = Ybus::from_network(&network, &mut diag).unwrap();

        let solver = PowerFlowSolver::new(SolveMethod::NewtonRaphson);
        let result = solver.solve(&mut network, &ybus).unwrap();

        assert!(result.converged(), "log: {:?}", result.log);

        let bus2 = result
            .buses
            .iter()
            .find(|b| b.bus == BusId::new(2))
            .unwrap();
        assert_eq!(bus2.kind, BusKind::Pq, "bus must end the run as PQ");
        assert!(
            bus2.magnitude.value() < 1.05,
            "voltage drops once the setpoint is unholdable"
        );

        // Generator output is pinned at Qmax: Q_gen = Q_injected + Q_load.
        let q_inj = solved_q_at_bus(&network, &result, 1);
        let q_gen_mvar = q_inj * 100.0 + 50.0;
        assert!(
            (q_gen_mvar - 10.0).abs() < 0.01,
            "Q pinned at Qmax, got {:.3} Mvar",
            q_gen_mvar
        );

        assert!(
            result.log.iter().any(|line| line.contains("PV->PQ")),
            "switch must be reported in the iteration log"
        );
    }

    #[test]
    fn test_gauss_seidel_pins_q_at_limit() {
        let mut network = q_limited_network();
        let mut diag = Diagnostics::new();
        let ybus = Ybus::from_network(&network, &mut diag).unwrap();

        let solver = PowerFlowSolver::new(SolveMethod::GaussSeidel).with_max_iterations(500);
        let result = solver.solve(&mut network, &ybus).unwrap();

        assert!(result.converged(), "log: {:?}", result.log);
        let bus2 = result
            .buses
            .iter()
            .find(|b| b.bus == BusId::new(2))
            .unwrap();
        assert_eq!(bus2.kind, BusKind::Pq);

        let q_inj = solved_q_at_bus(&network, &result, 1);
        let q_gen_mvar = q_inj * 100.0 + 50.0;
        assert!((q_gen_mvar - 10.0).abs() < 0.05, "got {:.3} Mvar", q_gen_mvar);
    }

    #[test]
    fn test_wide_limits_never_switch() {
        let buses = vec![
            Bus::new(1, "slack", "2"),
            Bus::new(2, "gen", "1")
                .with_voltage(1.02, 0.0)
                .with_generation(30.0, 0.0)
                .with_q_limits(-100.0, 100.0)
                .with_load(20.0, 10.0),
        ];
        let branches = vec![Branch::line(1, 2, 1, 0.01, 0.1)];
        let mut network = Network::load("wide", buses, branches).unwrap();
        let mut diag = Diagnostics::new();
        let ybus = Ybus::from_network(&network, &mut diag).unwrap();

        let result = PowerFlowSolver::new(SolveMethod::NewtonRaphson)
            .solve(&mut network, &ybus)
            .unwrap();

        assert!(result.converged());
        let bus2 = result
            .buses
            .iter()
            .find(|b| b.bus == BusId::new(2))
            .unwrap();
        assert_eq!(bus2.kind, BusKind::Pv);
        assert!((bus2.magnitude.value() - 1.02).abs() < 1e-9, "setpoint held");
    }

    #[test]
    fn test_switch_is_irreversible() {
        let network = q_limited_network();
        let mut diag = Diagnostics::new();
        let ybus = Ybus::from_network(&network, &mut diag).unwrap();
        let mut case = PfCase::from_network(&network, &ybus, 100.0).unwrap();
        let mut log = Vec::new();

        // At the setpoint state the PV bus is far over its band.
        let switched = case.enforce_q_limits(&ybus, &mut log);
        assert!(switched);
        assert_eq!(case.kinds[1], BusKind::Pq);
        let pinned_q_spec = case.q_spec[1];
        assert!((pinned_q_spec - (10.0 - 50.0) / 100.0).abs() < 1e-12);

        // Even if a later state would put Q back inside the band, the bus
        // is no longer inspected: no switch back, specification untouched.
        case.v_mag[1] = 0.7;
        let switched_again = case.enforce_q_limits(&ybus, &mut log);
        assert!(!switched_again);
        assert_eq!(case.kinds[1], BusKind::Pq);
        assert_eq!(case.q_spec[1], pinned_q_spec);
    }
}
